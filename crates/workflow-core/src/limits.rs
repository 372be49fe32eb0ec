// workflow-core/src/limits.rs
// ============================================================================
// Module: Static Ceilings
// Description: Every fixed numeric bound the engine enforces, collected here.
// Purpose: Give each ceiling a single named constant instead of scattering
// magic numbers through the interpreter, validator, and handlers.
// ============================================================================

/// Maximum `Workflow.name` length, in characters.
pub const MAX_WORKFLOW_NAME_LENGTH: usize = 100;
/// Maximum number of blocks in one published version.
pub const MAX_BLOCK_COUNT: usize = 200;
/// Maximum run wall-clock duration, in milliseconds.
pub const MAX_RUN_DURATION_MS: u64 = 600_000;
/// Maximum `sleep` block duration, in milliseconds.
pub const MAX_SLEEP_DURATION_MS: u64 = 300_000;
/// Maximum `fetch` block timeout, in milliseconds.
pub const MAX_FETCH_TIMEOUT_MS: u64 = 60_000;
/// Default `fetch` block timeout, in milliseconds.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;
/// Maximum concurrent deferred goto-fanout workers.
pub const MAX_CONCURRENT_DEFERRED: u32 = 10;
/// Maximum consecutive synchronous goto transitions before a run fails.
pub const MAX_GOTO_DEPTH: u32 = 50;
/// Maximum page size for cursor-paginated list endpoints.
pub const PAGINATION_MAX_SIZE: usize = 250;
/// Default page size for cursor-paginated list endpoints.
pub const PAGINATION_DEFAULT_SIZE: usize = 50;
/// Default `goto_max_concurrent` when a block omits it.
pub const DEFAULT_GOTO_MAX_CONCURRENT: u32 = 10;
/// Default engine-internal rate limit, requests per minute per client.
pub const DEFAULT_INTERNAL_RATE_LIMIT_PER_MINUTE: u32 = 60;
/// Default public per-slug rate limit, requests per minute per `(ipHash, slug)`.
pub const DEFAULT_PUBLIC_RATE_LIMIT_PER_MINUTE: u32 = 10;
/// Rate limiter reaper interval, in seconds.
pub const RATE_LIMITER_REAP_INTERVAL_SECS: u64 = 60;
