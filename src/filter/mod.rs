//! What the viewer has asked to see, and which articles that selects.
//!
//! [`FilterStateManager`] owns and persists the [`FilterState`](crate::model::FilterState);
//! [`compute_visible_articles`] is the pure selection function and
//! [`VisibleArticles`] memoises it over the live collection cache.

mod engine;
mod state;

pub use engine::{compute_visible_articles, ArticleSet, VisibleArticles};
pub use state::{filter_state_key, FilterStateManager};
