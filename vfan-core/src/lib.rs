//! vfan Core Library
//!
//! Shared types, wire protocol, and configuration for the vfan serial bridge.
//! This crate is used by both the hardware crate and the daemon.

pub mod board;
pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use board::*;
pub use config::{
    default_config_path, resolve_config_path, HwmonConfig, SerialConfig, StaticConfig,
    TimingConfig, CONFIG_ENV_VAR,
};
pub use error::*;
pub use types::*;
