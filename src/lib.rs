//! Bifrost - Resilient gateway for AI completion APIs
//!
//! This crate fronts multiple AI completion providers (OpenAI, Anthropic,
//! Groq, or any [`ProviderClient`] implementation) with one resilience
//! pipeline: retries with backoff and per-provider circuit breaking, a
//! fingerprint-keyed response cache, fixed-window rate limits, and a
//! queryable metrics and health engine, all backed by a pluggable
//! key-value store.
//!
//! # Chat Example
//!
//! ```rust,no_run
//! use bifrost::{Bifrost, ChatOptions};
//!
//! #[tokio::main]
//! async fn main() -> bifrost::Result<()> {
//!     let gateway = Bifrost::builder()
//!         .openai("sk-your-key")
//!         .groq("gsk-your-key")
//!         .build()?;
//!
//!     let response = gateway
//!         .chat("openai", "What is the capital of France?", &ChatOptions::new())
//!         .await?;
//!
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use bifrost::{Bifrost, ChatOptions};
//! use futures_util::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> bifrost::Result<()> {
//!     let gateway = Bifrost::builder().groq("gsk-your-key").build()?;
//!
//!     let mut stream = gateway
//!         .stream("groq", "Tell me a story.", &ChatOptions::new())
//!         .await?;
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod metrics;
pub mod providers;
pub mod ratelimit;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheStats, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BifrostError, Result};
pub use gateway::{Bifrost, BifrostBuilder, Gateway};
pub use metrics::{
    ExportFormat, HealthReport, HealthStatus, MetricRecord, MetricsEngine, MetricsReport,
    OperationMetrics, OverallHealth, PerformanceStats, Period, ProviderHealth, ProviderStatus,
};
pub use providers::{AnthropicClient, GroqClient, OpenAiClient, ProviderClient, ProviderRegistry};
pub use ratelimit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use retry::{Backoff, BreakerStatus, CircuitReport, Retrier, RetryPolicy};
pub use store::{KvStore, MemoryStore, MokaStore};
pub use types::{
    ChatOptions, ChatResponse, ChunkStream, EmbedOptions, EmbeddingResponse, TokenUsage,
};
