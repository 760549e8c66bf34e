//! Caching subsystem.
//!
//! A single cache: [`ResponseCache`], a fingerprint-keyed layer over the
//! pluggable [`KvStore`](crate::store::KvStore). See [`response`] module
//! docs for architecture and concurrency notes.

pub mod response;

pub use response::{CacheConfig, CacheStats, ResponseCache};
