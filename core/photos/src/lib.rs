//! Remote photo library access for albumsync.
//!
//! This crate provides:
//! - OAuth2 credentials and token persistence (two accepted token file shapes)
//! - The interactive loopback authorization flow and auto-refreshing tokens
//! - A trait-based interface to the album/media service with an HTTP client
//!   for the Google Photos Library API and an in-memory implementation
//!
//! # Design Principles
//! - The sync pipeline only sees the [`PhotosLibrary`] trait
//! - Token refresh and persistence are serialized per token source
//! - Remote failures carry the operation, status and a truncated body

pub mod auth;
pub mod client;
pub mod library;
pub mod memory;
pub mod token_store;

pub use auth::{
    authenticate, AccessTokenSource, AuthManager, CallbackServer, StaticToken, TokenManager,
    AUTHORIZATION_TIMEOUT,
};
pub use client::{PhotosClient, API_BASE};
pub use library::{
    get_or_create_album, AlbumCache, AttachReport, PhotosLibrary, RemoteMediaItem, UploadToken,
    MAX_BATCH_CREATE,
};
pub use memory::MemoryLibrary;
pub use token_store::{
    load_credentials, load_token, save_token, ClientCredentials, StoredToken, TokenFormat,
};
