//! # TCA Common Library
//!
//! Shared code for the trailer-to-campaign workspace:
//! - Common error type
//! - Bootstrap configuration loading (TOML, environment, platform defaults)
//! - Pipeline event types and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
