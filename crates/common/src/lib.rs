//! Shared utilities, configuration, and error handling for NeoFab
//!
//! This crate provides common functionality used across the NeoFab engine:
//! - Error types and handling
//! - Actor identity and capability sets
//! - Entity references
//! - Configuration management following 12-factor principles

pub mod actor;
pub mod config;
pub mod error;
pub mod refs;
pub mod state;

pub use actor::{Actor, Capability, CapabilityProvider, Role, RoleCapabilities};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use refs::EntityRef;
pub use state::StateError;
