//! llmlens - analytics and observability proxy for AI-model API calls
//!
//! This library provides the core functionality for the llmlens proxy:
//! provider client resolution, request forwarding, streaming re-encoding,
//! and per-request cost accounting.

pub mod catalog;
pub mod config;
pub mod cost;
pub mod error;
pub mod providers;
pub mod proxy;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
