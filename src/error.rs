use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `kioskwarden`.
///
/// Each subsystem defines its own error variant. Callers match on these to
/// decide recovery strategy; plumbing code continues to use `anyhow::Result`
/// for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Health probe ────────────────────────────────────────────────────
    #[error("probe: {0}")]
    Probe(#[from] ProbeError),

    // ── Remedial actions ────────────────────────────────────────────────
    #[error("action: {0}")]
    Action(#[from] ActionError),

    // ── State store ─────────────────────────────────────────────────────
    #[error("state store: {0}")]
    StateStore(#[from] StateStoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

/// Fatal at startup, before the tick loop begins. A misconfigured supervisor
/// refuses to run rather than run with undefined thresholds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Probe errors ───────────────────────────────────────────────────────────

/// Never fatal: folded into a failed `HealthSample` by the probe itself.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("health endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("health probe timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("malformed health payload: {0}")]
    Malformed(String),
}

// ─── Action errors ──────────────────────────────────────────────────────────

/// Never fatal to the process; triggers immediate escalation instead.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action {category} exited with status {status}")]
    NonZeroExit { category: String, status: String },

    #[error("action {category} timed out after {timeout_secs}s")]
    Timeout { category: String, timeout_secs: u64 },

    #[error("action {category} failed to spawn: {message}")]
    Spawn { category: String, message: String },
}

// ─── State store errors ─────────────────────────────────────────────────────

/// Write failures are absorbed: the in-memory state stays authoritative and
/// the write is retried next tick.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("failed writing state file: {0}")]
    Write(String),

    #[error("failed serializing state: {0}")]
    Serialize(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, WardenError>;
