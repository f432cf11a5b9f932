//! Small shared helpers: display-name cleaning and base URL validation.

mod base_url;
mod text;

pub use base_url::{validate_base_url, UrlValidationError};
pub use text::{clean_name, strip_control_chars, MAX_NAME_LENGTH};

/// Maximum accepted search term length (chars); longer input is truncated.
pub const MAX_SEARCH_TERM_LENGTH: usize = 256;
