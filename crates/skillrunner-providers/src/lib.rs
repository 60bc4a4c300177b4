//! The Provider strategy family and the Provider Registry.
//!
//! Every vendor adapter shares the same retry/backoff envelope and the same
//! SSE line-parser: the wire plumbing is generic, only the request/response
//! shape per vendor differs.

pub mod anthropic;
pub mod groq;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod registry;
pub mod sse;
pub mod testing;

pub use provider::{ChunkSink, HealthStatus, Provider, ProviderInfo};
pub use registry::ProviderRegistry;
