//! hardness-providers — Solver Client adapters.
//!
//! Implements the `Solver` trait for OpenAI-compatible chat completion
//! endpoints and a scripted mock, plus the configuration that selects them.

pub mod config;
pub mod mock;
pub mod openai;

pub use config::{create_solver, load_config, load_config_from, HardnessConfig, ProviderConfig};
