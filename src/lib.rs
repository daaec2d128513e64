//! # Commons
//!
//! A communities and membership server for research-data repositories,
//! usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! commons = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use commons::cache::IdentityCache;
//! use commons::index::CommunityIndex;
//! use commons::notify::Notifier;
//! use commons::server::{AppState, create_router};
//! use commons::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/commons.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(store),
//!     index: Arc::new(CommunityIndex::new()),
//!     identity_cache: IdentityCache::new(Duration::from_secs(300)),
//!     notifier: Notifier::default(),
//!     groups_enabled: true,
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI entrypoint. Disable with `default-features = false`.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod notify;
pub mod policy;
pub mod server;
pub mod store;
pub mod types;
