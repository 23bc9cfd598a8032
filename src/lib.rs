//! LocalHaven CMS Survey Service Library
//!
//! Collects product-research survey responses and exposes them to an
//! authenticated admin.
//!
//! ## Modules
//!
//! - `types` - Core data structures (submissions, stored responses, metrics)
//! - `crypto` - Digest and constant-time comparison helpers
//! - `config` - Environment and command-line configuration
//! - `storage` - SQLite persistence and schema migrations
//! - `cache` - Time-bounded cache for result listings
//! - `survey` - Submission validation and the survey repository
//! - `auth` - Admin login and bearer-token verification
//! - `api` - HTTP API, rate limiting and client IP resolution

pub mod types;
pub mod crypto;
pub mod config;
pub mod storage;
pub mod cache;
pub mod survey;
pub mod auth;
pub mod api;

pub use types::*;
pub use config::{Config, Environment};
pub use survey::SurveyService;
pub use auth::AuthGate;
