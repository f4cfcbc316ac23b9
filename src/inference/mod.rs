//! The reasoning side of the loop: a pluggable [`ReasoningBackend`] and the
//! [`InferenceGateway`] that keeps its failures from reaching the loop.

pub mod backend;
pub mod error;
pub mod gateway;
pub mod gemini;
pub mod prompt;

pub use backend::{MediaResolution, ReasoningBackend, ReasoningReply, ReasoningRequest};
pub use error::InferenceError;
pub use gateway::InferenceGateway;
pub use gemini::GeminiBackend;
