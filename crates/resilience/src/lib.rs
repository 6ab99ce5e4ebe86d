//! Resilience primitives for the inference path: Circuit Breaker (§4.4),
//! Response Cache (§4.5), and Request Queue (§4.6).

mod cache;
mod circuit_breaker;
mod queue;

pub use cache::ResponseCache;
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use queue::{Processor, QueueStats, RequestQueue};
