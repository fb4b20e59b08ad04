//! Identifier normalization and the shared data model for the federated
//! library-availability search service.
//!
//! This crate is pure: no I/O, no async, no knowledge of any particular
//! catalog. Everything here is safe to call from any other crate in the
//! workspace without pulling in a runtime.

pub mod isbn;
pub mod model;

pub use isbn::{parse as parse_isbn, IsbnError, ParsedIsbn};
pub use model::{
    fingerprint, AdapterConfig, BookHolding, BranchId, BranchRecord, ErrorKind, LibrarySystem,
    MaterialType, Protocol, SearchResult, Status, SystemError, SystemId, SystemValidationError,
    AGGREGATE_SOURCE_SENTINEL,
};
