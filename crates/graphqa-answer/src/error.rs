//! Error types for the graphqa-answer crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Graph error: {0}")]
    Graph(#[from] graphqa_graph::GraphError),

    #[error("Inference error: {0}")]
    Inference(#[from] crate::inference::InferenceError),

    #[error("Pipeline already terminated")]
    Terminated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
