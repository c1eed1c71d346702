pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod response;
pub mod server;

use std::sync::Arc;

use crate::{chain::StakeVerifier, config::Config};
use self::rate_limit::RateLimiter;

/// Shared request context: immutable configuration plus the process-wide
/// collaborators. Cheap to clone; nothing in here is mutated per request
/// (the limiter's interior state is its own concern).
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<Config>,
    pub stake_verifier: Arc<dyn StakeVerifier>,
    pub rate_limiter: Arc<RateLimiter>,
}
