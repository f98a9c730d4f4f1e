use crate::action::ActionCategory;
use crate::error::StateStoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ── Escalation state ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No pending failures.
    #[default]
    Idle,
    /// Failures observed, below the trigger threshold.
    Accumulating,
    /// An action was issued; awaiting verification.
    Cooldown,
}

/// Level is monotone non-decreasing within an escalation episode and resets
/// to 0 only on a confirmed recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EscalationState {
    pub level: u8,
    pub level_entered_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub phase: Phase,
    /// Set while in cooldown; the escalation window opens when it passes.
    pub cooldown_until: Option<DateTime<Utc>>,
}

// ── Degraded mode ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DegradedModeFlag {
    pub active: bool,
    pub reason: Option<String>,
    pub entered_at: Option<DateTime<Utc>>,
    /// Consecutive samples confirming a pending toggle (hysteresis).
    #[serde(default)]
    pub confirm_streak: u32,
}

// ── Aggregate ────────────────────────────────────────────────────

/// The sole source of truth across supervisor restarts. Owned exclusively by
/// the tick loop: read once at tick start, mutated once, written once at
/// tick end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PersistentState {
    pub escalation: EscalationState,
    /// Per-category action timestamps inside each category's rolling window.
    #[serde(default)]
    pub rate_windows: BTreeMap<ActionCategory, Vec<DateTime<Utc>>>,
    #[serde(default)]
    pub degraded: DegradedModeFlag,
    pub last_recovery_time: Option<DateTime<Utc>>,
}

// ── Store ────────────────────────────────────────────────────────

/// Durable JSON snapshot at a fixed path, human-inspectable and safe to
/// delete for a manual reset.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing or corrupt file reinitializes to the
    /// idle defaults: the supervisor fails open to healthy, never to the
    /// most escalated state.
    pub fn load(&self) -> PersistentState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        "state file unreadable ({e}); starting from defaults"
                    );
                }
                return PersistentState::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "state file corrupt ({e}); starting from defaults"
                );
                PersistentState::default()
            }
        }
    }

    /// Atomic replace: write to a temp file, then rename over the target. A
    /// concurrent reader always sees a complete previously-committed
    /// snapshot, never a torn one.
    pub fn persist(&self, state: &PersistentState) -> Result<(), StateStoreError> {
        let rendered = serde_json::to_string_pretty(state)
            .map_err(|e| StateStoreError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StateStoreError::Write(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, rendered)
            .map_err(|e| StateStoreError::Write(format!("writing {}: {e}", temp_path.display())))?;

        if let Err(rename_error) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StateStoreError::Write(format!(
                "replacing {}: {rename_error}",
                self.path.display()
            )));
        }

        Ok(())
    }
}
