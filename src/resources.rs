use crate::config::ResourceConfig;
use crate::state::DegradedModeFlag;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

// ── Samples ──────────────────────────────────────────────────────

/// One resource pressure reading. Transient, same lifecycle as a health
/// sample.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub free_memory_kb: u64,
    pub load: f64,
}

// ── Monitor ──────────────────────────────────────────────────────

/// Reads free memory and load from /proc. A read failure yields no sample
/// for the tick; degraded mode is left untouched rather than guessed.
#[derive(Debug, Clone, Default)]
pub struct ResourceMonitor;

impl ResourceMonitor {
    pub fn sample(&self, now: DateTime<Utc>) -> Result<ResourceSample> {
        let free_memory_kb = read_mem_available_kb(Path::new("/proc/meminfo"))?;
        let load = read_load_avg_1m(Path::new("/proc/loadavg"))?;
        Ok(ResourceSample {
            timestamp: now,
            free_memory_kb,
            load,
        })
    }
}

fn read_mem_available_kb(path: &Path) -> Result<u64> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    parse_mem_available_kb(&contents)
}

fn parse_mem_available_kb(contents: &str) -> Result<u64> {
    for line in contents.lines() {
        if !line.starts_with("MemAvailable:") {
            continue;
        }
        let value = line
            .split_whitespace()
            .nth(1)
            .context("MemAvailable value missing in /proc/meminfo")?;
        return value
            .parse::<u64>()
            .with_context(|| format!("invalid MemAvailable value: {value}"));
    }
    anyhow::bail!("MemAvailable field missing in /proc/meminfo")
}

fn read_load_avg_1m(path: &Path) -> Result<f64> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    parse_load_avg_1m(&contents)
}

fn parse_load_avg_1m(contents: &str) -> Result<f64> {
    let first = contents
        .split_whitespace()
        .next()
        .context("loadavg missing first field")?;
    first
        .parse::<f64>()
        .with_context(|| format!("invalid loadavg value: {first}"))
}

// ── Degraded-mode hysteresis ─────────────────────────────────────

/// Fold one sample into the persisted degraded-mode flag. Entry requires K
/// consecutive below-floor samples; exit requires K consecutive at-or-above
/// samples. A single noisy reading never flips the mode.
pub fn apply_resource_sample(
    flag: &mut DegradedModeFlag,
    sample: &ResourceSample,
    resources: &ResourceConfig,
    now: DateTime<Utc>,
) {
    let below_floor = sample.free_memory_kb < resources.resource_floor_kb;
    let required = resources.degraded_hysteresis_samples;

    if below_floor {
        flag.confirm_streak = if flag.active {
            0
        } else {
            flag.confirm_streak.saturating_add(1)
        };
        if !flag.active && flag.confirm_streak >= required {
            flag.active = true;
            flag.reason = Some(format!(
                "free memory {} kB below floor {} kB for {} samples",
                sample.free_memory_kb, resources.resource_floor_kb, required
            ));
            flag.entered_at = Some(now);
            flag.confirm_streak = 0;
            tracing::warn!(
                free_memory_kb = sample.free_memory_kb,
                floor_kb = resources.resource_floor_kb,
                "entering degraded mode"
            );
        }
    } else {
        flag.confirm_streak = if flag.active {
            flag.confirm_streak.saturating_add(1)
        } else {
            0
        };
        if flag.active && flag.confirm_streak >= required {
            flag.active = false;
            flag.reason = None;
            flag.entered_at = None;
            flag.confirm_streak = 0;
            tracing::info!(
                free_memory_kb = sample.free_memory_kb,
                "leaving degraded mode"
            );
        }
    }
}
