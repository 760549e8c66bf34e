//! Public types for the Bifrost API.

mod options;
mod response;

pub use options::{ChatOptions, EmbedOptions};
pub use response::{ChatResponse, ChunkStream, EmbeddingResponse, TokenUsage};
