use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use newsdeck::api::{EntityStore, RestClient};
use newsdeck::config::{Config, API_TOKEN_ENV};
use newsdeck::default_mark::DefaultCollectionSelector;
use newsdeck::filter::{ArticleSet, FilterStateManager, VisibleArticles};
use newsdeck::model::{Collection, CollectionDetails};
use newsdeck::storage::{Database, DatabaseError};
use newsdeck::sync::{CollectionCache, CollectionSync};
use newsdeck::util::strip_control_chars;

/// Get the config directory path (~/.config/newsdeck/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsdeck"))
}

#[derive(Parser, Debug)]
#[command(name = "newsdeck", about = "Browse news articles through your source collections")]
struct Args {
    /// Act as this user (overrides `user_id` in config.toml)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Use a different config file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List your collections and the ones you can follow
    Collections,
    /// List articles through the saved filter, optionally changing it first
    Articles {
        /// Scope to a collection
        #[arg(long)]
        collection: Option<String>,
        /// Scope to a single source (within `--collection` when both are given)
        #[arg(long)]
        source: Option<String>,
        /// Case-insensitive title/snippet search
        #[arg(long)]
        search: Option<String>,
    },
    /// Clear the saved filter
    ResetFilter,
    /// Create a collection
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        public: bool,
        /// Initial member source (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Change name, description or visibility of a collection
    Edit {
        collection: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        public: Option<bool>,
    },
    AddSource {
        collection: String,
        source: String,
    },
    RemoveSource {
        collection: String,
        source: String,
    },
    Delete {
        collection: String,
    },
    Follow {
        collection: String,
    },
    Unfollow {
        collection: String,
    },
    /// Mark a collection you own or follow as your default
    SetDefault {
        collection: String,
    },
    ClearDefault,
}

fn print_collection(collection: &Collection, user_id: &str, default: Option<&str>) {
    let marker = if default == Some(collection.id.as_str()) {
        "*"
    } else {
        " "
    };
    let relation = if collection.is_owned_by(user_id) {
        "owner"
    } else if collection.is_followed {
        "following"
    } else {
        "public"
    };
    println!(
        "{} {:<26} {:<10} {:>3} sources  {}",
        marker,
        collection.id,
        relation,
        collection.sources.len(),
        strip_control_chars(&collection.name)
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::debug!(?config, "Configuration");

    let user_id = args
        .user
        .clone()
        .or_else(|| config.user_id.clone())
        .context("No user configured: pass --user or set user_id in config.toml")?;

    let token = config
        .resolve_token(std::env::var(API_TOKEN_ENV).ok())
        .map(SecretString::from);
    let client = RestClient::new(
        &config.api_base_url,
        token,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to create API client")?;

    let db_path = config_dir.join("state.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => Arc::new(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: Another instance of newsdeck appears to be running. Please close it and try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let store = Arc::new(client);
    let cache = Arc::new(CollectionCache::new());
    let sync = CollectionSync::new(Arc::clone(&store), Arc::clone(&cache), user_id.clone());

    let (reloaded, filter, default) = futures::join!(
        sync.reload(),
        FilterStateManager::restore(Arc::clone(&db), Arc::clone(&cache), &user_id),
        DefaultCollectionSelector::load(Arc::clone(&db), Arc::clone(&cache), &user_id),
    );
    reloaded.context("Failed to load collections")?;

    match args.command {
        Command::Collections => {
            let current_default = default.current();
            for collection in cache.snapshot() {
                print_collection(&collection, &user_id, current_default.as_deref());
            }
        }
        Command::Articles {
            collection,
            source,
            search,
        } => {
            if let Some(id) = &collection {
                if !filter.filter_by_collection(id).await {
                    anyhow::bail!("Unknown collection: {}", id);
                }
            }
            match (&collection, &source) {
                (Some(_), Some(id)) => {
                    filter.drill_into_source(id).await;
                }
                (None, Some(id)) => {
                    filter.filter_by_source(id).await;
                }
                _ => {}
            }
            if let Some(term) = &search {
                filter.filter_by_search(term).await;
            }
            if collection.is_none() && source.is_none() && filter.current().is_default() {
                if let Some(home) = default.current() {
                    filter.filter_by_collection(&home).await;
                }
            }

            let articles = ArticleSet::new(
                store
                    .list_articles()
                    .await
                    .context("Failed to load articles")?,
            );
            let view = VisibleArticles::new(config.memo_capacity);
            let state = filter.current();
            let visible = view.compute(&articles, &state, &cache);
            tracing::info!(total = articles.len(), visible = visible.len(), "Filtered articles");

            for article in visible.iter() {
                let date = article
                    .published_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{:<10} {:<24} {}",
                    date,
                    article.source_id(),
                    strip_control_chars(&article.title)
                );
            }
            println!("{} of {} articles", visible.len(), articles.len());
        }
        Command::ResetFilter => {
            filter.reset().await;
            println!("Filter cleared.");
        }
        Command::Create {
            name,
            description,
            public,
            sources,
        } => {
            let created = sync
                .create_collection(&name, &description, public, &sources)
                .await
                .context("Failed to create collection")?;
            println!("Created {} ({})", created.id, strip_control_chars(&created.name));
        }
        Command::Edit {
            collection,
            name,
            description,
            public,
        } => {
            let current = cache
                .get(&collection)
                .with_context(|| format!("Unknown collection: {}", collection))?;
            let mut details = CollectionDetails::of(&current);
            if let Some(name) = name {
                details.name = name;
            }
            if let Some(description) = description {
                details.description = description;
            }
            if let Some(public) = public {
                details.is_public = public;
            }
            sync.update_details(&collection, details)
                .await
                .context("Failed to update collection")?;
            println!("Updated {}", collection);
        }
        Command::AddSource { collection, source } => {
            sync.add_source(&collection, &source)
                .await
                .context("Failed to add source")?;
            println!("Added {} to {}", source, collection);
        }
        Command::RemoveSource { collection, source } => {
            sync.remove_source(&collection, &source)
                .await
                .context("Failed to remove source")?;
            println!("Removed {} from {}", source, collection);
        }
        Command::Delete { collection } => {
            sync.delete_collection(&collection)
                .await
                .context("Failed to delete collection")?;
            if default.clear_if_default(&collection).await {
                println!("Cleared default collection.");
            }
            println!("Deleted {}", collection);
        }
        Command::Follow { collection } => {
            sync.follow(&collection)
                .await
                .context("Failed to follow collection")?;
            println!("Following {}", collection);
        }
        Command::Unfollow { collection } => {
            sync.unfollow(&collection)
                .await
                .context("Failed to unfollow collection")?;
            if default.revalidate().await {
                println!("Cleared default collection.");
            }
            println!("Unfollowed {}", collection);
        }
        Command::SetDefault { collection } => {
            if !default.set_as_default(&collection).await {
                anyhow::bail!(
                    "Could not mark {} as default (it must be a collection you own or follow)",
                    collection
                );
            }
            println!("Default collection: {}", collection);
        }
        Command::ClearDefault => {
            if !default.clear_default().await {
                anyhow::bail!("Failed to clear default collection");
            }
            println!("Default collection cleared.");
        }
    }

    Ok(())
}
