use thiserror::Error;
use url::Url;

/// Errors from validating the Entity Store base URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP would send the session token in the clear.
    #[error("Insecure base URL: HTTPS required (except localhost)")]
    Insecure,
}

/// Validate and normalise the Entity Store base URL.
///
/// HTTPS is required except for `localhost`, `127.0.0.1` and `[::1]`. The
/// returned URL always ends in `/` so relative endpoint paths join beneath
/// it rather than replacing its last segment.
pub fn validate_base_url(raw: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(raw.trim())?;

    match url.scheme() {
        "https" => {}
        "http" => {
            let local = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if !local {
                return Err(UrlValidationError::Insecure);
            }
        }
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
