//! pairchat core - shared domain types
//!
//! This crate provides the types shared between the relay server
//! (`pairchatd`), the wire protocol, and the terminal client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod name;

pub use error::{DomainError, DomainResult};
pub use name::{ScreenName, MAX_NAME_LEN};
