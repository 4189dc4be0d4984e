//! graphqa-answer: Graph-grounded question answering.
//!
//! Retrieves grounding facts from Neo4j, composes a prompt around the
//! user's question, and asks an Ollama-compatible model for the answer.

pub mod error;
pub mod inference;
pub mod inspect;
pub mod pipeline;
pub mod prompt;

pub use error::PipelineError;
pub use inference::{Inference, InferenceError, OllamaClient};
pub use pipeline::{AnswerPipeline, LoopState, Turn};
pub use prompt::PromptComposer;
