//! The coordinator's only fatal error path (spec §4.9 "Failure semantics":
//! "the only fatal error path is an invalid ISBN"). Every per-system
//! failure is folded into the returned [`libfed_domain::SearchResult`]
//! instead.

use libfed_domain::IsbnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid ISBN: {0}")]
    InvalidIsbn(#[from] IsbnError),
}
