//! graphqa-core: Shared types, configuration, and error handling for graphqa.
//!
//! This crate provides the foundational types used across all graphqa crates:
//! - Facts and scalars projected from graph nodes
//! - Schema summaries, prompts, and answers
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::CoreError;
pub use types::{Answer, Fact, FactKind, Prompt, Scalar, SchemaSummary};
