use crate::action::ActionCategory;
use crate::error::{ConfigError, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// CLI override for the state file location - not serialized
    #[serde(skip)]
    pub state_file_override: Option<PathBuf>,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    #[serde(default)]
    pub actions: ActionsConfig,

    #[serde(default)]
    pub resources: ResourceConfig,
}

// ── Health monitoring ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Tick interval for the supervision loop, in seconds.
    #[serde(default = "default_health_check_interval_s")]
    pub health_check_interval_s: u64,
    /// Loopback health endpoint of the monitored service.
    #[serde(default = "default_health_url")]
    pub health_url: String,
    /// Hard timeout on a single probe request. Must be shorter than the tick.
    #[serde(default = "default_probe_timeout_s")]
    pub probe_timeout_s: u64,
    /// Max age of the page's liveness heartbeat before a sample counts stale.
    #[serde(default = "default_liveness_timeout_s")]
    pub liveness_timeout_s: u64,
    /// Window after supervisor start during which failures are ignored.
    #[serde(default = "default_startup_grace_period_s")]
    pub startup_grace_period_s: u64,
}

fn default_health_check_interval_s() -> u64 {
    30
}

fn default_health_url() -> String {
    "http://127.0.0.1:8080/healthz".into()
}

fn default_probe_timeout_s() -> u64 {
    5
}

fn default_liveness_timeout_s() -> u64 {
    90
}

fn default_startup_grace_period_s() -> u64 {
    120
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_s: default_health_check_interval_s(),
            health_url: default_health_url(),
            probe_timeout_s: default_probe_timeout_s(),
            liveness_timeout_s: default_liveness_timeout_s(),
            startup_grace_period_s: default_startup_grace_period_s(),
        }
    }
}

// ── Escalation thresholds ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Consecutive failed samples required before the first action fires.
    #[serde(default = "default_fail_count_threshold")]
    pub fail_count_threshold: u32,
    /// Post-action quiet period before a recurrence can escalate.
    #[serde(default = "default_verification_delay_s")]
    pub verification_delay_s: u64,
    /// How long after cooldown a recurring failure still counts as "the
    /// action didn't fix it" and bumps the level.
    #[serde(default = "default_escalation_window_s")]
    pub escalation_window_s: u64,
}

fn default_fail_count_threshold() -> u32 {
    3
}

fn default_verification_delay_s() -> u64 {
    90
}

fn default_escalation_window_s() -> u64 {
    300
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            fail_count_threshold: default_fail_count_threshold(),
            verification_delay_s: default_verification_delay_s(),
            escalation_window_s: default_escalation_window_s(),
        }
    }
}

// ── Remedial actions ─────────────────────────────────────────────

/// One external remedial command and its limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Shell command invoked via `sh -lc`.
    pub command: String,
    /// Hard timeout on the command. Must be shorter than the tick.
    pub timeout_s: u64,
    /// Max invocations allowed inside one rolling window.
    pub max_per_window: u32,
    /// Rolling window duration in seconds.
    pub window_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default = "default_soft_reload")]
    pub soft_reload: ActionConfig,
    #[serde(default = "default_process_restart")]
    pub process_restart: ActionConfig,
    #[serde(default = "default_session_restart")]
    pub session_restart: ActionConfig,
    #[serde(default = "default_service_restart")]
    pub service_restart: ActionConfig,
    #[serde(default = "default_reboot")]
    pub reboot: ActionConfig,
}

fn default_soft_reload() -> ActionConfig {
    ActionConfig {
        command: "curl -fsS -X POST http://127.0.0.1:8080/api/refresh".into(),
        timeout_s: 5,
        max_per_window: 6,
        window_s: 3600,
    }
}

fn default_process_restart() -> ActionConfig {
    ActionConfig {
        command: "systemctl --user restart kiosk-browser.service".into(),
        timeout_s: 20,
        max_per_window: 4,
        window_s: 3600,
    }
}

fn default_session_restart() -> ActionConfig {
    ActionConfig {
        command: "sudo systemctl restart display-manager.service".into(),
        timeout_s: 25,
        max_per_window: 2,
        window_s: 3600,
    }
}

fn default_service_restart() -> ActionConfig {
    ActionConfig {
        command: "sudo systemctl restart kiosk-app.service".into(),
        timeout_s: 25,
        max_per_window: 2,
        window_s: 3600,
    }
}

// The executor only waits for the trigger command to be accepted, not for
// the reboot itself, so a short timeout is enough. The day-long window is
// the reboot's own cap, independent of the hourly categories below it.
fn default_reboot() -> ActionConfig {
    ActionConfig {
        command: "sudo systemctl reboot".into(),
        timeout_s: 25,
        max_per_window: 1,
        window_s: 86_400,
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            soft_reload: default_soft_reload(),
            process_restart: default_process_restart(),
            session_restart: default_session_restart(),
            service_restart: default_service_restart(),
            reboot: default_reboot(),
        }
    }
}

impl ActionsConfig {
    pub fn for_category(&self, category: ActionCategory) -> &ActionConfig {
        match category {
            ActionCategory::SoftReload => &self.soft_reload,
            ActionCategory::ProcessRestart => &self.process_restart,
            ActionCategory::SessionRestart => &self.session_restart,
            ActionCategory::ServiceRestart => &self.service_restart,
            ActionCategory::Reboot => &self.reboot,
        }
    }
}

// ── Resource pressure ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Free-memory floor (MemAvailable) below which the host counts degraded.
    #[serde(default = "default_resource_floor_kb")]
    pub resource_floor_kb: u64,
    /// Consecutive confirming samples required to toggle degraded mode.
    #[serde(default = "default_degraded_hysteresis_samples")]
    pub degraded_hysteresis_samples: u32,
}

fn default_resource_floor_kb() -> u64 {
    150_000
}

fn default_degraded_hysteresis_samples() -> u32 {
    3
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            resource_floor_kb: default_resource_floor_kb(),
            degraded_hysteresis_samples: default_degraded_hysteresis_samples(),
        }
    }
}

// ── Loading & validation ─────────────────────────────────────────

impl Config {
    /// Load `~/.kioskwarden/config.toml`, writing defaults on first run.
    pub fn load_or_init() -> Result<Self> {
        let workspace_dir = workspace_dir()?;
        Self::load_from_dir(&workspace_dir)
    }

    pub fn load_from_dir(workspace_dir: &Path) -> Result<Self> {
        fs::create_dir_all(workspace_dir).map_err(ConfigError::Io)?;
        let config_path = workspace_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path).map_err(ConfigError::Io)?;
            toml::from_str::<Self>(&raw)
                .map_err(|e| ConfigError::Load(format!("{}: {e}", config_path.display())))?
        } else {
            let defaults = Self::default_with_paths(workspace_dir, &config_path);
            let rendered = toml::to_string_pretty(&defaults)
                .map_err(|e| ConfigError::Load(format!("rendering default config: {e}")))?;
            fs::write(&config_path, rendered).map_err(ConfigError::Io)?;
            defaults
        };

        config.workspace_dir = workspace_dir.to_path_buf();
        config.config_path = config_path;
        config.validate()?;
        Ok(config)
    }

    fn default_with_paths(workspace_dir: &Path, config_path: &Path) -> Self {
        Self {
            workspace_dir: workspace_dir.to_path_buf(),
            config_path: config_path.to_path_buf(),
            state_file_override: None,
            monitor: MonitorConfig::default(),
            escalation: EscalationConfig::default(),
            actions: ActionsConfig::default(),
            resources: ResourceConfig::default(),
        }
    }

    /// Path of the persisted supervisor state.
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file_override
            .clone()
            .unwrap_or_else(|| self.workspace_dir.join("state.json"))
    }

    /// Reject configurations the loop cannot run safely with. Fatal at
    /// startup only; never called once the loop is running.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let tick = self.monitor.health_check_interval_s;
        if tick == 0 {
            return Err(ConfigError::Validation(
                "monitor.health_check_interval_s must be > 0".into(),
            ));
        }
        if self.monitor.probe_timeout_s == 0 || self.monitor.probe_timeout_s >= tick {
            return Err(ConfigError::Validation(format!(
                "monitor.probe_timeout_s must be in 1..{tick} (strictly shorter than the tick)"
            )));
        }
        if self.monitor.liveness_timeout_s == 0 {
            return Err(ConfigError::Validation(
                "monitor.liveness_timeout_s must be > 0".into(),
            ));
        }
        if self.escalation.fail_count_threshold == 0 {
            return Err(ConfigError::Validation(
                "escalation.fail_count_threshold must be > 0".into(),
            ));
        }
        if self.escalation.verification_delay_s == 0 {
            return Err(ConfigError::Validation(
                "escalation.verification_delay_s must be > 0".into(),
            ));
        }
        if self.escalation.escalation_window_s == 0 {
            return Err(ConfigError::Validation(
                "escalation.escalation_window_s must be > 0".into(),
            ));
        }
        if self.resources.degraded_hysteresis_samples == 0 {
            return Err(ConfigError::Validation(
                "resources.degraded_hysteresis_samples must be > 0".into(),
            ));
        }

        for category in ActionCategory::LADDER {
            let action = self.actions.for_category(category);
            if action.command.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "actions.{category}.command must not be empty"
                )));
            }
            if action.timeout_s == 0 || action.timeout_s >= tick {
                return Err(ConfigError::Validation(format!(
                    "actions.{category}.timeout_s must be in 1..{tick} (strictly shorter than the tick)"
                )));
            }
            if action.max_per_window == 0 {
                return Err(ConfigError::Validation(format!(
                    "actions.{category}.max_per_window must be > 0"
                )));
            }
            if action.window_s == 0 {
                return Err(ConfigError::Validation(format!(
                    "actions.{category}.window_s must be > 0"
                )));
            }
        }

        Ok(())
    }
}

fn workspace_dir() -> Result<PathBuf> {
    let user_dirs = UserDirs::new()
        .ok_or_else(|| ConfigError::Load("could not determine home directory".into()))?;
    Ok(user_dirs.home_dir().join(".kioskwarden"))
}
