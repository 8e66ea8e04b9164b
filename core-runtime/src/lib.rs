//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the folder sync agent:
//! - Logging and tracing infrastructure
//! - Configuration management (builder and `.ignore/config.yaml`)
//! - Event bus for operator-visible pipeline outcomes
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync pipeline and the
//! agent binary depend on. It establishes the logging conventions and the
//! event broadcasting mechanism used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
