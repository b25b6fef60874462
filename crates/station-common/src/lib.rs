//! Shared types, error taxonomy, and configuration for the base station
//! diagnostic and self-healing core.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod types;
pub mod utils;

pub use circuit_breaker::{with_circuit_breaker, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::Config;
pub use error::{CoreError, Result};
pub use metrics::{ComponentHealth, HealthLevel, HealthStatus};
pub use retry::{retry_operation, RetryExecutor, RetryStrategy};
pub use types::*;
pub use utils::{calculate_percentile, current_timestamp, new_id, validate_station_id};
