//! Common utilities and types shared across albumsync crates.
//!
//! This module provides the error type used by every layer and the small
//! value types that travel between the remote client and the sync pipeline.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{AlbumTitle, ApiOperation};
