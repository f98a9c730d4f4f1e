use crate::action::ActionCategory;
use crate::config::Config;
use crate::state::{Phase, PersistentState, StateStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;

/// `kioskwarden status`: render the persisted snapshot for an operator.
/// Reads the same file the loop writes; atomic replace means we always see
/// a complete, previously-committed snapshot.
pub fn run_status(config: &Config) -> Result<()> {
    let state_file = config.state_file_path();
    println!("🩺 kioskwarden status");
    println!("  State file: {}", state_file.display());

    if !state_file.exists() {
        println!("  ❌ no state file yet");
        println!("  💡 Start the supervisor with: kioskwarden run");
        return Ok(());
    }

    let raw = fs::read_to_string(&state_file)
        .with_context(|| format!("Failed to read {}", state_file.display()))?;
    let state: PersistentState = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", state_file.display()))?;

    match state.escalation.phase {
        Phase::Idle => println!("  ✅ idle (no pending failures)"),
        Phase::Accumulating => println!(
            "  ⚠️  accumulating failures ({} consecutive, threshold {})",
            state.escalation.consecutive_failures, config.escalation.fail_count_threshold
        ),
        Phase::Cooldown => {
            let until = state
                .escalation
                .cooldown_until
                .map_or_else(|| "unknown".to_string(), |ts| ts.to_rfc3339());
            println!("  ⏳ cooldown until {until} (verifying last action)");
        }
    }

    let category = ActionCategory::for_level(state.escalation.level);
    println!(
        "  Escalation level: {} ({category})",
        state.escalation.level
    );

    if state.degraded.active {
        let reason = state.degraded.reason.as_deref().unwrap_or("unknown");
        println!("  ⚠️  degraded mode active: {reason}");
    } else {
        println!("  ✅ resource pressure normal");
    }

    match state.last_recovery_time {
        Some(ts) => println!("  Last recovery: {} ({})", ts.to_rfc3339(), age_of(ts)),
        None => println!("  Last recovery: never observed"),
    }

    for category in ActionCategory::LADDER {
        let action = config.actions.for_category(category);
        let used = state
            .rate_windows
            .get(&category)
            .map_or(0, |window| recent_count(window, action.window_s));
        println!(
            "  {category}: {used}/{} used in the last {}s",
            action.max_per_window, action.window_s
        );
    }

    Ok(())
}

/// `kioskwarden reset`: delete the state file. The next load reinitializes
/// to idle defaults.
pub fn run_reset(config: &Config) -> Result<()> {
    let store = StateStore::new(config.state_file_path());
    if !store.path().exists() {
        println!("Nothing to reset: {} does not exist", store.path().display());
        return Ok(());
    }

    fs::remove_file(store.path())
        .with_context(|| format!("Failed to remove {}", store.path().display()))?;
    println!("Removed {}", store.path().display());
    Ok(())
}

fn recent_count(window: &[DateTime<Utc>], window_s: u64) -> usize {
    let span = chrono::Duration::try_seconds(i64::try_from(window_s).unwrap_or(i64::MAX))
        .unwrap_or(chrono::Duration::MAX);
    let horizon = Utc::now()
        .checked_sub_signed(span)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    window.iter().filter(|ts| **ts >= horizon).count()
}

fn age_of(ts: DateTime<Utc>) -> String {
    let secs = Utc::now().signed_duration_since(ts).num_seconds().max(0);
    if secs < 120 {
        format!("{secs}s ago")
    } else if secs < 7200 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
