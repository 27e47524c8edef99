//! # System Constants
//!
//! Operational defaults and well-known names shared across modules. The
//! tunable values here are the fallbacks behind [`crate::config`].

/// Key prefix for persisted provider availability records
pub const PROVIDER_STATUS_KEY_PREFIX: &str = "provider_status:";

/// Outstanding worker calls a single realm may host
pub const MAX_CONCURRENT_TASKS: usize = 4;

/// Local fail-safe deadline for a dispatched worker task
pub const DEFAULT_WORKER_TIMEOUT_MS: u64 = 30_000;

/// Confidence reported when a content source already declares its language
pub const DECLARED_LANGUAGE_CONFIDENCE: f64 = 1.0;

/// Retry defaults
pub mod retry {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
    pub const DEFAULT_JITTER_MIN: f64 = 0.2;
    pub const DEFAULT_JITTER_MAX: f64 = 0.3;
}

/// Result cache defaults
pub mod cache {
    pub const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;
    pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;
}

/// Batch scheduling defaults
pub mod batch {
    pub const DEFAULT_BATCH_SIZE: usize = 10;
    pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;
    pub const DEFAULT_CHUNK_TARGET_CHARS: usize = 4_000;
}

/// Provider availability defaults
pub mod providers {
    pub const DEFAULT_STATUS_TTL_SECONDS: u64 = 60;
}

/// Worker message types understood by the default realm handler
pub mod worker_task_types {
    pub const PROVIDER_CALL: &str = "provider_call";
}
