//! drive_preview - Browse and share Google Drive folders of STL files and images.
//!
//! This library provides:
//! - Signed, expiring share tokens for a single file or folder
//! - One content-access interface over direct owner access and tokenised
//!   preview access through the Drive Gateway
//! - The Drive Gateway itself: token endpoints, token-scoped relays and a
//!   generic CORS relay for the owner path
//! - Folder navigation with breadcrumbs, caching and preview-image lookup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use drive_preview::{ClientConfig, ContentCache, ContentClient, Navigator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig {
//!         gateway_url: Some("https://gateway.example.com".to_string()),
//!         ..Default::default()
//!     };
//!     let client = ContentClient::from_credential("preview:<share-token>", &config)?;
//!
//!     let mut nav = Navigator::new(client, Arc::new(ContentCache::new()));
//!     nav.initialize("folder-id", "Models").await?;
//!     for folder in &nav.contents().folders {
//!         println!("{}", folder);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod auth;
pub mod cache;
pub mod classify;
pub mod client;
pub mod error;
pub mod gateway;
pub mod models;
pub mod navigation;
pub mod preview_search;
pub mod token;
pub mod url_parser;

// Re-exports for convenience
pub use access::{AccessContext, ClientConfig, ContentAccess, ContentClient};
pub use auth::{AccessTokenProvider, OwnerCredential, ServiceAccountAuth};
pub use cache::ContentCache;
pub use classify::{classify, EntryKind, FolderContents, ListingOptions, SortOrder};
pub use client::DriveClient;
pub use error::{DriveError, Result};
pub use models::DriveEntry;
pub use navigation::{Breadcrumb, LoadState, Navigator};
pub use token::{ResourceType, ShareClaims, ShareSecret, TokenError, TokenService};
pub use url_parser::{extract_id, extract_share_token};
