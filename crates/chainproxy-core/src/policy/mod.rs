//! Policy engine: admission and retry rules applied around every forward.
//!
//! ```text
//! Call → [RateLimiter] → [Balancer] → [Transport] → (failure) → [RetryLimit] → ...
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::RateLimiter;
pub use retry::RetryLimit;
