use std::time::Duration;

/// Page size for the indexer's cursor-based REST pagination.
pub const INDEXER_PAGE_SIZE: u32 = 1000;

/// Bounded exponential backoff for transient indexer HTTP failures:
/// three attempts, doubling from 1s.
pub const INDEXER_RETRY_ATTEMPTS: u32 = 3;
pub const INDEXER_RETRY_BASE: Duration = Duration::from_secs(1);

/// Blob-store pin retries: up to two retries (three attempts total) with
/// 1s/2s backoff on non-deadline failures.
pub const PIN_RETRY_ATTEMPTS: u32 = 3;
pub const PIN_RETRY_DELAYS_SECS: [u64; 2] = [1, 2];

/// Hard ceiling on the per-attempt pin deadline, further clamped from the
/// configured `ipfs.pin_timeout`.
pub const MAX_PIN_DEADLINE: Duration = Duration::from_secs(60);

pub const DEFAULT_PIN_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_STORAGE_WARNING_PCT: u8 = 80;
pub const DEFAULT_MIN_FREE_DISK_SPACE_GB: u64 = 5;

/// Retry/scanner worker wake interval and per-wake batch caps.
pub const SCANNER_WAKE_INTERVAL: Duration = Duration::from_secs(120);
pub const SCANNER_PENDING_BATCH_CAP: usize = 50;
pub const DEFAULT_MAX_RETRIES: i64 = 5;
pub const STALE_ACCOUNT_THRESHOLD: Duration = Duration::from_secs(3600);

/// Realtime subscriber crash-restart policy.
pub const SUBSCRIBER_MAX_RESTARTS: u32 = 5;
pub const SUBSCRIBER_RESTART_COOLDOWN: Duration = Duration::from_secs(60);

/// Bound on the orchestrator's trigger queue: enqueue is non-blocking and
/// drops the trigger when the queue is full.
pub const TRIGGER_QUEUE_CAPACITY: usize = 256;

/// Bound on a human-readable `error_msg` stored on a `PinIntent`.
pub const MAX_ERROR_MSG_LEN: usize = 512;

pub const DEFAULT_DB_FILE_NAME: &str = "porcupin.db";

/// `retry_count` sentinel for failures the error taxonomy marks
/// non-retriable (bad URI, oversize asset): set high enough that no
/// configured `max_retries` will ever select the intent for a retry.
pub const NON_RETRIABLE_RETRY_COUNT: i64 = 1_000_000;

/// Per-attempt timeout for the C4 step-3 on-chain metadata recovery path
/// (resolve + fetch-over-gateway).
pub const METADATA_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the HEAD probe against the configured gateway.
pub const HEAD_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
