//! Middleware for authentication and rate limiting.

mod auth;
mod cache;
mod rate_limit;

pub use auth::{auth_middleware, require_admin, require_employer, CurrentUser};
pub use cache::Cache;
pub use rate_limit::{
    rate_limit_auth_middleware, rate_limit_middleware, LocalRateLimiter, RateLimiter,
};
