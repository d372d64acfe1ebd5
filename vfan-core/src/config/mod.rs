//! Configuration types for the vfan bridge
//!
//! # Architecture
//!
//! There is a single [`StaticConfig`], loaded once at startup from a TOML
//! file. Nothing is persisted at runtime: every connection rediscovers the
//! device and the hwmon directory from scratch.

mod paths;
mod static_config;

pub use paths::{default_config_path, resolve_config_path, CONFIG_ENV_VAR};
pub use static_config::{HwmonConfig, SerialConfig, StaticConfig, TimingConfig};
