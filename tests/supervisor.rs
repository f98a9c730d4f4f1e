//! End-to-end supervision loop tests: a wiremock health endpoint, a fake
//! executor recording requested categories, and a temp-dir state store.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kioskwarden::action::{ActionCategory, ActionExecutor, ActionOutcome};
use kioskwarden::config::{ActionConfig, Config};
use kioskwarden::probe::HealthProbe;
use kioskwarden::resources::ResourceMonitor;
use kioskwarden::state::{Phase, PersistentState, StateStore};
use kioskwarden::supervisor::run_tick;

/// Records requested categories and replies with a scripted outcome.
struct FakeExecutor {
    outcome: ActionOutcome,
    requested: Mutex<Vec<ActionCategory>>,
}

impl FakeExecutor {
    fn succeeding() -> Self {
        Self::with_outcome(ActionOutcome::Success)
    }

    fn with_outcome(outcome: ActionOutcome) -> Self {
        Self {
            outcome,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<ActionCategory> {
        self.requested.lock().unwrap().clone()
    }
}

impl ActionExecutor for FakeExecutor {
    async fn execute(&self, category: ActionCategory, _action: &ActionConfig) -> ActionOutcome {
        self.requested.lock().unwrap().push(category);
        self.outcome
    }
}

fn test_config(tmp: &TempDir, health_url: &str) -> Config {
    let mut config = Config::load_from_dir(tmp.path()).unwrap();
    config.monitor.health_url = format!("{health_url}/healthz");
    config.monitor.probe_timeout_s = 2;
    config.monitor.startup_grace_period_s = 0;
    config.escalation.fail_count_threshold = 2;
    // Keep resource sampling from toggling degraded mode on the test host.
    config.resources.resource_floor_kb = 0;
    config
}

fn probe_without_grace(config: &Config) -> HealthProbe {
    HealthProbe::new(&config.monitor, Utc::now() - chrono::Duration::hours(1))
}

async fn mock_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "last_heartbeat": Utc::now().to_rfc3339(),
            "content_ok": true,
        })))
        .mount(server)
        .await;
}

async fn mock_stale(server: &MockServer) {
    let old = Utc::now() - chrono::Duration::hours(2);
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "last_heartbeat": old.to_rfc3339(),
            "content_ok": true,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn healthy_ticks_never_act() {
    let server = MockServer::start().await;
    mock_healthy(&server).await;

    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &server.uri());
    let probe = probe_without_grace(&config);
    let executor = FakeExecutor::succeeding();
    let mut state = PersistentState::default();

    for _ in 0..3 {
        let record = run_tick(&config, &probe, &ResourceMonitor::default(), &executor, &mut state).await;
        assert!(record.is_none());
    }

    assert_eq!(state.escalation.phase, Phase::Idle);
    assert_eq!(state.escalation.consecutive_failures, 0);
    assert!(executor.requested().is_empty());
}

#[tokio::test]
async fn threshold_failures_trigger_soft_reload_then_cooldown() {
    let server = MockServer::start().await;
    mock_stale(&server).await;

    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &server.uri());
    let probe = probe_without_grace(&config);
    let executor = FakeExecutor::succeeding();
    let monitor = ResourceMonitor::default();
    let mut state = PersistentState::default();

    // First failure: below threshold, nothing fires.
    let record = run_tick(&config, &probe, &monitor, &executor, &mut state).await;
    assert!(record.is_none());
    assert_eq!(state.escalation.consecutive_failures, 1);

    // Second failure hits the threshold: exactly one action.
    let record = run_tick(&config, &probe, &monitor, &executor, &mut state)
        .await
        .expect("threshold tick must act");
    assert_eq!(record.category, ActionCategory::SoftReload);
    assert_eq!(record.outcome, ActionOutcome::Success);
    assert_eq!(executor.requested(), vec![ActionCategory::SoftReload]);
    assert_eq!(state.escalation.phase, Phase::Cooldown);
    assert!(state.escalation.cooldown_until.is_some());

    // Third failing tick lands inside cooldown: no second action.
    let record = run_tick(&config, &probe, &monitor, &executor, &mut state).await;
    assert!(record.is_none());
    assert_eq!(executor.requested().len(), 1);
}

#[tokio::test]
async fn recovery_resets_escalation_completely() {
    let stale = MockServer::start().await;
    mock_stale(&stale).await;
    let healthy = MockServer::start().await;
    mock_healthy(&healthy).await;

    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &stale.uri());
    let probe = probe_without_grace(&config);
    let executor = FakeExecutor::succeeding();
    let monitor = ResourceMonitor::default();
    let mut state = PersistentState::default();

    for _ in 0..2 {
        run_tick(&config, &probe, &monitor, &executor, &mut state).await;
    }
    assert_eq!(state.escalation.phase, Phase::Cooldown);

    // Point the probe at the healthy endpoint: full reset.
    let healthy_config = test_config(&tmp, &healthy.uri());
    let healthy_probe = probe_without_grace(&healthy_config);
    let record = run_tick(&healthy_config, &healthy_probe, &monitor, &executor, &mut state).await;
    assert!(record.is_none());
    assert_eq!(state.escalation.phase, Phase::Idle);
    assert_eq!(state.escalation.level, 0);
    assert_eq!(state.escalation.consecutive_failures, 0);
    assert!(state.last_recovery_time.is_some());
}

#[tokio::test]
async fn execution_failure_escalates_to_next_category() {
    let server = MockServer::start().await;
    mock_stale(&server).await;

    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &server.uri());
    let probe = probe_without_grace(&config);
    let executor = FakeExecutor::with_outcome(ActionOutcome::Failure);
    let monitor = ResourceMonitor::default();
    let mut state = PersistentState::default();

    run_tick(&config, &probe, &monitor, &executor, &mut state).await;
    let record = run_tick(&config, &probe, &monitor, &executor, &mut state)
        .await
        .unwrap();
    assert_eq!(record.category, ActionCategory::SoftReload);
    assert_eq!(record.outcome, ActionOutcome::Failure);
    // Command never ran: level bumps immediately, no verification wait.
    assert_eq!(state.escalation.level, 1);
    assert_eq!(state.escalation.phase, Phase::Accumulating);

    // Next failing tick fires the stronger category straight away.
    let record = run_tick(&config, &probe, &monitor, &executor, &mut state)
        .await
        .unwrap();
    assert_eq!(record.category, ActionCategory::ProcessRestart);
}

#[tokio::test]
async fn rate_cap_suppresses_without_fallthrough() {
    let server = MockServer::start().await;
    mock_stale(&server).await;

    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp, &server.uri());
    config.actions.soft_reload.max_per_window = 1;
    let probe = probe_without_grace(&config);
    let executor = FakeExecutor::succeeding();
    let monitor = ResourceMonitor::default();
    let mut state = PersistentState::default();

    run_tick(&config, &probe, &monitor, &executor, &mut state).await;
    let record = run_tick(&config, &probe, &monitor, &executor, &mut state)
        .await
        .unwrap();
    assert_eq!(record.outcome, ActionOutcome::Success);

    // Force a fresh trigger at the same level: clear cooldown but keep the
    // failure count, as a lapsed escalation window would.
    state.escalation.phase = Phase::Accumulating;
    state.escalation.cooldown_until = None;

    let record = run_tick(&config, &probe, &monitor, &executor, &mut state)
        .await
        .unwrap();
    assert_eq!(record.outcome, ActionOutcome::SkippedRateLimited);
    // Suppressed, not escalated: only the first soft reload ever ran.
    assert_eq!(executor.requested(), vec![ActionCategory::SoftReload]);
    assert_eq!(state.escalation.level, 0);
}

#[tokio::test]
async fn grace_period_ignores_boot_failures() {
    let tmp = TempDir::new().unwrap();
    // Nothing listens here; every probe would fail outside grace.
    let mut config = test_config(&tmp, "http://127.0.0.1:9");
    config.monitor.startup_grace_period_s = 3600;
    let probe = HealthProbe::new(&config.monitor, Utc::now());
    let executor = FakeExecutor::succeeding();
    let mut state = PersistentState::default();

    for _ in 0..3 {
        let record = run_tick(&config, &probe, &ResourceMonitor::default(), &executor, &mut state).await;
        assert!(record.is_none());
    }
    assert_eq!(state.escalation.consecutive_failures, 0);
    assert!(executor.requested().is_empty());
}

/// In-memory writer so a test can assert on emitted log lines.
#[derive(Clone, Default)]
struct LogSink(Arc<Mutex<Vec<u8>>>);

impl LogSink {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn tick_log_reports_resource_load() {
    let server = MockServer::start().await;
    mock_healthy(&server).await;

    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &server.uri());
    let probe = probe_without_grace(&config);
    let executor = FakeExecutor::succeeding();
    let mut state = PersistentState::default();

    let sink = LogSink::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    run_tick(&config, &probe, &ResourceMonitor::default(), &executor, &mut state).await;
    drop(guard);

    let logs = sink.contents();
    assert!(logs.contains("tick"), "tick summary missing: {logs}");
    // The sampled 1-minute load average must be auditable per tick.
    assert!(logs.contains("load="), "load field missing: {logs}");
}

#[tokio::test]
async fn state_survives_supervisor_restart() {
    let server = MockServer::start().await;
    mock_stale(&server).await;

    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &server.uri());
    let probe = probe_without_grace(&config);
    let executor = FakeExecutor::succeeding();
    let monitor = ResourceMonitor::default();
    let store = StateStore::new(config.state_file_path());

    let mut state = store.load();
    for _ in 0..2 {
        run_tick(&config, &probe, &monitor, &executor, &mut state).await;
        store.persist(&state).unwrap();
    }

    // "Restart": a fresh load sees the committed escalation state.
    let reloaded = StateStore::new(config.state_file_path()).load();
    assert_eq!(reloaded, state);
    assert_eq!(reloaded.escalation.phase, Phase::Cooldown);
    assert_eq!(
        reloaded.rate_windows[&ActionCategory::SoftReload].len(),
        1
    );
}
