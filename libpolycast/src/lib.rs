//! Polycast - publish one piece of media to many social platforms
//!
//! A publish request fans out into one post record and one background job
//! per platform. Jobs refresh OAuth tokens as needed, upload media, create
//! the post and, for platforms that publish asynchronously, poll until the
//! platform reports an outcome. Each platform succeeds or fails on its own.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod registry;
pub mod service;
pub mod store;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{PolycastError, Result};
pub use registry::PlatformRegistry;
pub use service::PolycastService;
pub use types::{MediaKind, Platform, PlatformSettings, Post, PostStatus, TikTokSettings};
