//! Civica Portal Common Library
//!
//! Shared code for the portal services including:
//! - Domain models (papers, access requests, profiles, chat)
//! - Flat-file document stores
//! - Upload store abstraction (disk or remote media host)
//! - Paper workflow and access-request services
//! - Chat room with presence tracking
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod access;
pub mod auth;
pub mod chat;
pub mod config;
pub mod errors;
pub mod mail;
pub mod metrics;
pub mod models;
pub mod papers;
pub mod store;
pub mod uploads;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use store::{ChatHistoryStore, FlatFileStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Length of access PINs minted on approval
pub const PIN_LENGTH: usize = 6;
