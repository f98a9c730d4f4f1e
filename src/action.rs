use crate::config::ActionConfig;
use crate::error::ActionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::process::Command;
use tokio::time::{Duration, timeout};

// ── Categories ───────────────────────────────────────────────────

/// The remedial ladder, weakest to strongest. The escalation level indexes
/// directly into this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    SoftReload,
    ProcessRestart,
    SessionRestart,
    ServiceRestart,
    Reboot,
}

pub const MAX_LEVEL: u8 = 4;

impl ActionCategory {
    pub const LADDER: [Self; 5] = [
        Self::SoftReload,
        Self::ProcessRestart,
        Self::SessionRestart,
        Self::ServiceRestart,
        Self::Reboot,
    ];

    /// Category for an escalation level. Levels beyond the ladder clamp to
    /// the strongest category.
    pub fn for_level(level: u8) -> Self {
        let idx = usize::from(level.min(MAX_LEVEL));
        Self::LADDER[idx]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SoftReload => "soft_reload",
            Self::ProcessRestart => "process_restart",
            Self::SessionRestart => "session_restart",
            Self::ServiceRestart => "service_restart",
            Self::Reboot => "reboot",
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Outcomes ─────────────────────────────────────────────────────

/// Result of one attempted remedial action. `Failure` and `Timeout` mean the
/// command itself did not run to success, which is a stronger signal than a
/// command that ran without fixing the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failure,
    Timeout,
    SkippedRateLimited,
}

impl ActionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::SkippedRateLimited => "skipped_rate_limited",
        }
    }
}

/// Ephemeral per-attempt record, for logging and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub category: ActionCategory,
    pub timestamp: DateTime<Utc>,
    pub outcome: ActionOutcome,
}

// ── Executor ─────────────────────────────────────────────────────

/// Capability seam for remedial side effects. The production implementation
/// shells out; tests substitute a fake to assert on requested categories
/// without touching the device.
pub trait ActionExecutor {
    fn execute(
        &self,
        category: ActionCategory,
        action: &ActionConfig,
    ) -> impl Future<Output = ActionOutcome> + Send;
}

/// Runs the configured command through `sh -lc` under a hard timeout. The
/// executor waits only for the trigger command to be accepted, never for the
/// remedial effect itself (a reboot trigger returns long before the reboot).
#[derive(Debug, Clone, Default)]
pub struct ShellActionExecutor;

impl ActionExecutor for ShellActionExecutor {
    async fn execute(&self, category: ActionCategory, action: &ActionConfig) -> ActionOutcome {
        let budget = Duration::from_secs(action.timeout_s);
        let invocation = Command::new("sh")
            .arg("-lc")
            .arg(&action.command)
            .kill_on_drop(true)
            .output();

        match timeout(budget, invocation).await {
            Ok(Ok(output)) if output.status.success() => {
                tracing::info!(category = %category, "action command succeeded");
                ActionOutcome::Success
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let err = ActionError::NonZeroExit {
                    category: category.as_str().into(),
                    status: output.status.to_string(),
                };
                tracing::error!(category = %category, stderr = %stderr.trim(), "{err}");
                ActionOutcome::Failure
            }
            Ok(Err(spawn_error)) => {
                let err = ActionError::Spawn {
                    category: category.as_str().into(),
                    message: spawn_error.to_string(),
                };
                tracing::error!(category = %category, "{err}");
                ActionOutcome::Failure
            }
            Err(_) => {
                let err = ActionError::Timeout {
                    category: category.as_str().into(),
                    timeout_secs: action.timeout_s,
                };
                tracing::error!(category = %category, "{err}");
                ActionOutcome::Timeout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(command: &str, timeout_s: u64) -> ActionConfig {
        ActionConfig {
            command: command.into(),
            timeout_s,
            max_per_window: 1,
            window_s: 3600,
        }
    }

    #[test]
    fn ladder_maps_levels_in_order() {
        assert_eq!(ActionCategory::for_level(0), ActionCategory::SoftReload);
        assert_eq!(ActionCategory::for_level(1), ActionCategory::ProcessRestart);
        assert_eq!(ActionCategory::for_level(4), ActionCategory::Reboot);
        // Out-of-range levels clamp rather than panic.
        assert_eq!(ActionCategory::for_level(9), ActionCategory::Reboot);
    }

    #[test]
    fn category_serializes_as_snake_case() {
        let json = serde_json::to_string(&ActionCategory::SessionRestart).unwrap();
        assert_eq!(json, "\"session_restart\"");
    }

    #[tokio::test]
    async fn successful_command_reports_success() {
        let outcome = ShellActionExecutor
            .execute(ActionCategory::SoftReload, &action("true", 5))
            .await;
        assert_eq!(outcome, ActionOutcome::Success);
    }

    #[tokio::test]
    async fn nonzero_exit_reports_failure() {
        let outcome = ShellActionExecutor
            .execute(ActionCategory::SoftReload, &action("exit 3", 5))
            .await;
        assert_eq!(outcome, ActionOutcome::Failure);
    }

    #[tokio::test]
    async fn hung_command_reports_timeout() {
        let outcome = ShellActionExecutor
            .execute(ActionCategory::SoftReload, &action("sleep 30", 1))
            .await;
        assert_eq!(outcome, ActionOutcome::Timeout);
    }
}
