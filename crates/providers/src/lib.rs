//! Inference providers (§4.7) and the Inference Strategy Manager (§4.8).

mod cli;
mod fallback;
mod http;
mod manager;
mod parsing;
mod provider;

pub use cli::CliProvider;
pub use fallback::FallbackProvider;
pub use http::HttpProvider;
pub use manager::InferenceManager;
pub use provider::{HealthSummary, InferenceProvider, ProviderHealth};
