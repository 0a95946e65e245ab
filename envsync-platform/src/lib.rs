//! # envsync-platform
//!
//! Boundary to the remote environment platform.
//!
//! - [`api::PlatformApi`]: the operations the reconciler needs
//! - [`http::HttpPlatform`]: blocking HTTP implementation (`ureq`)
//! - [`memory::MemoryPlatform`]: in-memory implementation with fault injection
//! - [`config::PlatformConfig`]: explicit connection settings
//! - [`retry`]: bounded exponential backoff for transient failures

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod retry;

pub use api::{
    CreateEnvironment, CreateRevision, EnvironmentDetails, EnvironmentSummary, Operation,
    PlatformApi,
};
pub use config::{ConfigError, Credential, PlatformConfig};
pub use error::RemoteError;
pub use http::HttpPlatform;
pub use memory::MemoryPlatform;
pub use retry::RetryPolicy;
