use crate::action::{ActionExecutor, ActionOutcome, ActionRecord, ShellActionExecutor};
use crate::config::Config;
use crate::engine;
use crate::probe::HealthProbe;
use crate::ratelimit;
use crate::resources::{ResourceMonitor, apply_resource_sample};
use crate::state::{PersistentState, StateStore};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{Duration, MissedTickBehavior};

/// Entry point for `kioskwarden run`: wire the production probe, monitor and
/// shell executor into the supervision loop.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let probe = HealthProbe::new(&config.monitor, Utc::now());
    let store = StateStore::new(config.state_file_path());
    run_loop(
        config,
        probe,
        ResourceMonitor::default(),
        ShellActionExecutor::default(),
        store,
    )
    .await
}

/// The fixed-interval supervision loop. Single-threaded and serialized: a
/// tick runs to completion before the next begins, and every await inside a
/// tick carries a timeout shorter than the tick interval, so the loop always
/// makes progress regardless of downstream health.
pub async fn run_loop<E: ActionExecutor>(
    config: Arc<Config>,
    probe: HealthProbe,
    monitor: ResourceMonitor,
    executor: E,
    store: StateStore,
) -> Result<()> {
    // Loaded once; this process is the file's only writer, so the in-memory
    // copy stays authoritative even when a write fails.
    let mut state = store.load();
    let mut pending_write = false;

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.monitor.health_check_interval_s));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sigterm = signal(SignalKind::terminate())?;

    tracing::info!(
        state_file = %store.path().display(),
        interval_s = config.monitor.health_check_interval_s,
        "supervisor loop starting"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_tick(&config, &probe, &monitor, &executor, &mut state).await;
                match store.persist(&state) {
                    Ok(()) => pending_write = false,
                    Err(e) => {
                        // Not fatal: retried next tick.
                        pending_write = true;
                        tracing::warn!("{e}; keeping in-memory state, will retry");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = sigterm.recv() => break,
        }
    }

    tracing::info!("supervisor loop stopping");
    if pending_write && let Err(e) = store.persist(&state) {
        tracing::warn!("{e}; final state write failed");
    }
    Ok(())
}

/// One atomic tick: sample, decide, optionally act, fold the outcome back.
/// Returns the action record for the tick, if any action was attempted.
pub async fn run_tick<E: ActionExecutor>(
    config: &Config,
    probe: &HealthProbe,
    monitor: &ResourceMonitor,
    executor: &E,
    state: &mut PersistentState,
) -> Option<ActionRecord> {
    let now = Utc::now();

    let health = probe.sample(now).await;

    let resource_load = match monitor.sample(now) {
        Ok(resource) => {
            apply_resource_sample(&mut state.degraded, &resource, &config.resources, now);
            Some(resource.load)
        }
        Err(e) => {
            // Leave the degraded flag untouched rather than guess.
            tracing::debug!("resource sample unavailable: {e:#}");
            None
        }
    };

    let request = engine::evaluate(state, &health, &config.escalation, now);

    let record = if let Some(request) = request {
        let action = config.actions.for_category(request.category);
        let window = state.rate_windows.entry(request.category).or_default();
        let allowed =
            ratelimit::check_and_record(window, action.max_per_window, action.window_s, now);

        let outcome = if allowed {
            executor.execute(request.category, action).await
        } else {
            ActionOutcome::SkippedRateLimited
        };

        engine::apply_outcome(state, &request, outcome, &config.escalation, now);
        Some(ActionRecord {
            category: request.category,
            timestamp: now,
            outcome,
        })
    } else {
        None
    };

    // One structured line per tick: the sample, the decision, the outcome.
    tracing::info!(
        health = health.status.as_str(),
        liveness_age_s = health.liveness_age_seconds,
        marker = health.content_marker_present,
        grace = health.grace_applied,
        load = resource_load,
        degraded = state.degraded.active,
        level = state.escalation.level,
        failures = state.escalation.consecutive_failures,
        phase = ?state.escalation.phase,
        action = record.as_ref().map(|r| r.category.as_str()),
        outcome = record.as_ref().map(|r| r.outcome.as_str()),
        "tick"
    );

    record
}
