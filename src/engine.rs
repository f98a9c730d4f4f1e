use crate::action::{ActionCategory, ActionOutcome, MAX_LEVEL};
use crate::config::EscalationConfig;
use crate::probe::HealthSample;
use crate::state::{EscalationState, Phase, PersistentState};
use chrono::{DateTime, Duration, Utc};

// ── Decision ─────────────────────────────────────────────────────

/// A proposed action for this tick. The level is proposed, not yet
/// committed: it becomes the stored level only in [`apply_outcome`], so a
/// rate-limited denial leaves escalation state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRequest {
    pub category: ActionCategory,
    pub level: u8,
}

impl ActionRequest {
    fn for_level(level: u8) -> Self {
        let level = level.min(MAX_LEVEL);
        Self {
            category: ActionCategory::for_level(level),
            level,
        }
    }
}

/// Fold one health sample into the escalation state and decide whether an
/// action should be attempted. Free of I/O: the tick loop supplies samples
/// and executes requests.
///
/// Rules, in order:
/// 1. A healthy sample fully resets escalation memory from any state.
/// 2. An unhealthy sample increments the consecutive-failure count.
/// 3. At the failure threshold, the current level's action is proposed.
/// 4. In cooldown, a recurrence inside the escalation window proposes the
///    next level up (capped); a recurrence after the window lapsed
///    re-proposes the current level.
pub fn evaluate(
    state: &mut PersistentState,
    sample: &HealthSample,
    escalation: &EscalationConfig,
    now: DateTime<Utc>,
) -> Option<ActionRequest> {
    if sample.is_healthy() {
        if state.escalation != EscalationState::default() {
            tracing::info!(
                level = state.escalation.level,
                failures = state.escalation.consecutive_failures,
                "recovery confirmed; clearing escalation state"
            );
            state.escalation = EscalationState::default();
            state.last_recovery_time = Some(now);
        }
        return None;
    }

    let esc = &mut state.escalation;
    esc.consecutive_failures = esc.consecutive_failures.saturating_add(1);

    match esc.phase {
        Phase::Idle | Phase::Accumulating => {
            esc.phase = Phase::Accumulating;
            if esc.consecutive_failures < escalation.fail_count_threshold {
                return None;
            }
            Some(proposed_request(state))
        }
        Phase::Cooldown => {
            let until = state.escalation.cooldown_until.unwrap_or(now);
            if now < until {
                return None;
            }

            let deadline = until
                .checked_add_signed(secs(escalation.escalation_window_s))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if now <= deadline {
                // The action ran but the failure recurred: step up the
                // ladder.
                Some(ActionRequest::for_level(
                    state.escalation.level.saturating_add(1),
                ))
            } else {
                // The escalation window lapsed; treat this as a fresh
                // trigger at the current level. Level never decays here.
                state.escalation.phase = Phase::Accumulating;
                Some(proposed_request(state))
            }
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::try_seconds(i64::try_from(value).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

/// The level to act at from idle/accumulating. Degraded mode skips the
/// cheapest rung: a soft reload is no help when the host itself is starved.
fn proposed_request(state: &PersistentState) -> ActionRequest {
    let mut level = state.escalation.level;
    if state.degraded.active && level == 0 {
        level = 1;
    }
    ActionRequest::for_level(level)
}

/// Commit the result of an attempted action back into escalation state.
///
/// Success enters cooldown at the proposed level. Failure or timeout means
/// the command itself did not run, a stronger signal than a command that ran
/// without fixing anything: the level is bumped immediately, with no
/// verification wait. A rate-limited skip changes nothing.
pub fn apply_outcome(
    state: &mut PersistentState,
    request: &ActionRequest,
    outcome: ActionOutcome,
    escalation: &EscalationConfig,
    now: DateTime<Utc>,
) {
    let esc = &mut state.escalation;
    match outcome {
        ActionOutcome::Success => {
            if esc.level != request.level {
                esc.level_entered_at = Some(now);
            }
            esc.level = request.level;
            esc.phase = Phase::Cooldown;
            esc.cooldown_until = Some(
                now.checked_add_signed(secs(escalation.verification_delay_s))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
        }
        ActionOutcome::Failure | ActionOutcome::Timeout => {
            let bumped = request.level.saturating_add(1).min(MAX_LEVEL);
            if esc.level != bumped {
                esc.level_entered_at = Some(now);
            }
            esc.level = bumped;
            esc.phase = Phase::Accumulating;
            esc.cooldown_until = None;
            tracing::warn!(
                category = %request.category,
                outcome = outcome.as_str(),
                level = bumped,
                "action did not run; escalating without verification wait"
            );
        }
        ActionOutcome::SkippedRateLimited => {
            tracing::warn!(
                category = %request.category,
                "action suppressed by rate limiter; holding level for next tick"
            );
        }
    }
}
