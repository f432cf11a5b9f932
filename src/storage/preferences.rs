use std::future::Future;

use anyhow::Result;

use super::schema::Database;

/// Key/value persistence used by the filter manager and the default
/// collection selector.
///
/// `Database` is the production implementation; tests substitute in-memory
/// or failing stores.
pub trait PreferenceStore: Send + Sync {
    fn get_preference(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn set_preference(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    fn delete_preference(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key, or `None` if unset.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a preference. Removing a missing key is not an error.
    pub async fn delete_preference(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All preferences whose key starts with `prefix`, ordered by key.
    pub async fn get_preferences_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        // Escape LIKE wildcards so "filter.state.a_b" does not match "filter.state.axb".
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("{}%", escaped);
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM user_preferences WHERE key LIKE ? ESCAPE '\\' ORDER BY key",
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

impl PreferenceStore for Database {
    async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        Database::get_preference(self, key).await
    }

    async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        Database::set_preference(self, key, value).await
    }

    async fn delete_preference(&self, key: &str) -> Result<()> {
        Database::delete_preference(self, key).await
    }
}
