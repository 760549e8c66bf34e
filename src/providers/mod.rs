//! Upstream provider clients.
//!
//! One file per vendor, all implementing [`ProviderClient`]. Clients are
//! plain HTTP wire adapters: request shaping, status-to-error mapping and
//! SSE decoding live here, while retry, caching and metrics are layered on
//! by the gateway.

mod anthropic;
mod backpressure;
mod groq;
mod openai;
mod registry;
mod sse;
mod traits;

pub use anthropic::AnthropicClient;
pub use groq::GroqClient;
pub use openai::OpenAiClient;
pub use registry::ProviderRegistry;
pub use traits::ProviderClient;
