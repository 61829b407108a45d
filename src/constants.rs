// Tuning defaults for the image loading pipeline - adjust these to balance
// memory use vs network traffic
// All byte and time budgets in one place

/// Total byte budget for the in-memory image cache.
pub const DEFAULT_CACHE_COST_LIMIT: u64 = 200_000_000;

/// Per-request timeout for artwork downloads, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Idle connections kept per host for bursty gallery loads.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 20;
