use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::checker::EndpointChecker;
use crate::config::MonitorConfig;
use crate::error::DispatchError;
use crate::gate::{self, GateDecision, NotificationGate};
use crate::mailer::Notifier;
use crate::models::Report;

/// Time source for the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What a single cycle ended up doing.
#[derive(Debug)]
pub enum CycleOutcome {
    Healthy,
    Notified { failures: usize },
    Suppressed { failures: usize, remaining: Duration },
    DispatchFailed { failures: usize, error: DispatchError },
}

impl CycleOutcome {
    pub fn failures(&self) -> usize {
        match self {
            CycleOutcome::Healthy => 0,
            CycleOutcome::Notified { failures }
            | CycleOutcome::Suppressed { failures, .. }
            | CycleOutcome::DispatchFailed { failures, .. } => *failures,
        }
    }
}

pub struct Monitor {
    config: MonitorConfig,
    checker: EndpointChecker,
    notifier: Box<dyn Notifier>,
    clock: Box<dyn Clock>,
    gate: NotificationGate,
    cycles: u64,
}

impl Monitor {
    pub fn new(config: MonitorConfig, notifier: Box<dyn Notifier>, clock: Box<dyn Clock>) -> Result<Self> {
        let checker = EndpointChecker::new(config.request_timeout(), config.max_concurrency)?;
        let gate = NotificationGate::new(config.min_notify_interval());

        Ok(Self {
            config,
            checker,
            notifier,
            clock,
            gate,
            cycles: 0,
        })
    }

    pub fn gate(&self) -> &NotificationGate {
        &self.gate
    }

    /// Polls until `shutdown` resolves and returns the number of cycles run.
    /// Shutdown is only honoured between cycles: a cycle that has started,
    /// including its mail dispatch, always completes.
    pub async fn run<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        info!(
            endpoints = self.config.endpoints.len(),
            poll_interval_secs = self.config.poll_interval_secs,
            min_notify_interval_secs = self.config.min_notify_interval_secs,
            max_concurrency = self.config.max_concurrency,
            "Monitor started"
        );

        tokio::pin!(shutdown);
        loop {
            if (&mut shutdown).now_or_never().is_some() {
                break;
            }
            self.run_cycle().await;
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.clock.sleep(self.config.poll_interval()) => {}
            }
        }

        info!(cycles = self.cycles, "Monitor stopped");
        self.cycles
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        let cycle = self.cycles;
        let start_time = Utc::now();
        info!(cycle, endpoints = self.config.endpoints.len(), "Check cycle started");

        let results = self.checker.check_all(&self.config.endpoints).await;
        let outcome = match gate::aggregate(&results) {
            None => CycleOutcome::Healthy,
            Some(report) => self.notify(&report).await,
        };

        let duration = Utc::now() - start_time;
        info!(
            cycle,
            checked = results.len(),
            failures = outcome.failures(),
            "Check cycle completed in {:.2}s",
            duration.num_milliseconds() as f64 / 1000.0
        );
        outcome
    }

    async fn notify(&mut self, report: &Report) -> CycleOutcome {
        let failures = report.failure_lines.len();
        let now = self.clock.now();

        match self.gate.decide(now) {
            GateDecision::Suppress { remaining } => {
                warn!(
                    failures,
                    remaining_secs = remaining.as_secs(),
                    "Failures found, notification suppressed by rate limit"
                );
                CycleOutcome::Suppressed { failures, remaining }
            }
            GateDecision::Send => {
                info!(failures, "Failures found, sending notification");
                match self.notifier.send(report).await {
                    Ok(()) => {
                        self.gate.record(now);
                        CycleOutcome::Notified { failures }
                    }
                    Err(error) => {
                        error!(%error, "Failed to send notification");
                        CycleOutcome::DispatchFailed { failures, error }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MailConfig, MailTls, MailType};
    use crate::mailer::render_body;
    use crate::models::Endpoint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        reports: Arc<Mutex<Vec<Report>>>,
        attempts: Arc<AtomicUsize>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<Report> {
            self.reports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, report: &Report) -> Result<(), DispatchError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DispatchError::NoRecipients);
            }
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    /// Sleeping advances virtual time instantly. Fires `stop` once `stop_after` sleeps happened.
    #[derive(Clone)]
    struct FakeClock {
        now: Arc<Mutex<Instant>>,
        sleeps: Arc<AtomicUsize>,
        stop_after: usize,
        stop: Arc<Notify>,
    }

    impl FakeClock {
        fn new(stop_after: usize) -> Self {
            Self {
                now: Arc::new(Mutex::new(Instant::now())),
                sleeps: Arc::new(AtomicUsize::new(0)),
                stop_after,
                stop: Arc::new(Notify::new()),
            }
        }

        fn advance(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
            if self.sleeps.fetch_add(1, Ordering::SeqCst) + 1 == self.stop_after {
                self.stop.notify_one();
            }
        }
    }

    fn config(endpoints: Vec<Endpoint>) -> MonitorConfig {
        MonitorConfig {
            endpoints,
            mail: MailConfig {
                user: "monitor@example.com".into(),
                password: "secret".into(),
                host: "smtp.example.com:25".into(),
                recipients: "ops@example.com".into(),
                mail_type: MailType::Html,
                tls: MailTls::None,
                timeout_secs: 5,
            },
            poll_interval_secs: 600,
            min_notify_interval_secs: 1800,
            request_timeout_secs: 5,
            max_concurrency: 1,
        }
    }

    async fn serve(server: &MockServer, route: &str, body: &str, expected_hits: u64) -> Endpoint {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_hits)
            .mount(server)
            .await;
        Endpoint::new(format!("{}{}", server.uri(), route))
    }

    fn monitor(endpoints: Vec<Endpoint>, notifier: &RecordingNotifier, clock: &FakeClock) -> Monitor {
        Monitor::new(config(endpoints), Box::new(notifier.clone()), Box::new(clock.clone())).unwrap()
    }

    #[tokio::test]
    async fn single_failure_sends_one_notification() {
        let server = MockServer::start().await;
        let healthy = serve(&server, "/v3/hot/topic", r#"{"ok":true}"#, 1).await;
        let empty = serve(&server, "/v3/skin", "", 1).await;
        let notifier = RecordingNotifier::default();
        let clock = FakeClock::new(0);
        let mut monitor = monitor(vec![healthy, empty.clone()], &notifier, &clock);

        let outcome = monitor.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Notified { failures: 1 }), "{outcome:?}");
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        let line = format!("request to {} failed: result is empty", empty.url);
        assert_eq!(sent[0].failure_lines, vec![line.clone()]);
        assert!(render_body(&sent[0]).contains(&line));
        assert_eq!(monitor.gate().last_notify(), Some(clock.now()));
    }

    #[tokio::test]
    async fn healthy_cycle_sends_nothing() {
        let server = MockServer::start().await;
        let endpoints = vec![
            serve(&server, "/a", "{}", 1).await,
            serve(&server, "/b", "[1,2,3]", 1).await,
        ];
        let notifier = RecordingNotifier::default();
        let clock = FakeClock::new(0);
        let mut monitor = monitor(endpoints, &notifier, &clock);

        let outcome = monitor.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Healthy));
        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.gate().last_notify(), None);
    }

    #[tokio::test]
    async fn transport_failure_does_not_skip_remaining_endpoints() {
        let server = MockServer::start().await;
        let reachable = serve(&server, "/ok", "{}", 1).await;
        let notifier = RecordingNotifier::default();
        let clock = FakeClock::new(0);
        let mut monitor = monitor(
            vec![Endpoint::new("http://127.0.0.1:9/unreachable"), reachable],
            &notifier,
            &clock,
        );

        let outcome = monitor.run_cycle().await;

        assert_eq!(outcome.failures(), 1);
        let sent = notifier.sent();
        assert!(sent[0].failure_lines[0].starts_with("request to http://127.0.0.1:9/unreachable failed: "));
        server.verify().await;
    }

    #[tokio::test]
    async fn repeated_failures_within_min_interval_are_suppressed() {
        let server = MockServer::start().await;
        let broken = serve(&server, "/broken", "{\"error\":\"db down\"}", 3).await;
        let notifier = RecordingNotifier::default();
        let clock = FakeClock::new(0);
        let mut monitor = monitor(vec![broken], &notifier, &clock);

        assert!(matches!(monitor.run_cycle().await, CycleOutcome::Notified { .. }));

        clock.sleep(Duration::from_secs(600)).await;
        let outcome = monitor.run_cycle().await;
        assert!(
            matches!(
                outcome,
                CycleOutcome::Suppressed { failures: 1, remaining } if remaining == Duration::from_secs(1200)
            ),
            "{outcome:?}"
        );
        assert_eq!(notifier.sent().len(), 1);

        clock.advance(Duration::from_secs(1200));
        assert!(matches!(monitor.run_cycle().await, CycleOutcome::Notified { .. }));
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_failure_is_logged_and_retried_next_cycle() {
        let server = MockServer::start().await;
        let broken = serve(&server, "/broken", "maintenance", 2).await;
        let notifier = RecordingNotifier::failing();
        let clock = FakeClock::new(0);
        let mut monitor = monitor(vec![broken], &notifier, &clock);

        let outcome = monitor.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::DispatchFailed { failures: 1, .. }), "{outcome:?}");
        assert_eq!(monitor.gate().last_notify(), None);

        let outcome = monitor.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::DispatchFailed { .. }));
        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_polls_until_shutdown() {
        let server = MockServer::start().await;
        let endpoints = vec![
            serve(&server, "/a", "{}", 3).await,
            serve(&server, "/b", "", 3).await,
        ];
        let notifier = RecordingNotifier::default();
        let clock = FakeClock::new(3);
        let stop = Arc::clone(&clock.stop);
        let mut monitor = monitor(endpoints, &notifier, &clock);

        let cycles = monitor.run(async move { stop.notified().await }).await;

        assert_eq!(cycles, 3);
        assert_eq!(clock.sleeps.load(Ordering::SeqCst), 3);
        // 600s polls against an 1800s gate: only the first cycle notifies.
        assert_eq!(notifier.sent().len(), 1);
        server.verify().await;
    }

    /// Fires the shutdown signal from inside `send`, then yields before finishing.
    #[derive(Clone)]
    struct SignallingNotifier {
        inner: RecordingNotifier,
        stop: Arc<Notify>,
    }

    #[async_trait]
    impl Notifier for SignallingNotifier {
        async fn send(&self, report: &Report) -> Result<(), DispatchError> {
            self.stop.notify_one();
            tokio::task::yield_now().await;
            self.inner.send(report).await
        }
    }

    #[tokio::test]
    async fn shutdown_during_dispatch_lets_the_cycle_finish() {
        let server = MockServer::start().await;
        let broken = serve(&server, "/broken", "", 1).await;
        let recorder = RecordingNotifier::default();
        let clock = FakeClock::new(0);
        let stop = Arc::new(Notify::new());
        let notifier = SignallingNotifier {
            inner: recorder.clone(),
            stop: Arc::clone(&stop),
        };
        let mut monitor =
            Monitor::new(config(vec![broken]), Box::new(notifier), Box::new(clock.clone())).unwrap();

        let cycles = monitor.run(async move { stop.notified().await }).await;

        assert_eq!(cycles, 1);
        assert_eq!(recorder.sent().len(), 1);
        assert!(monitor.gate().last_notify().is_some());
        assert_eq!(clock.sleeps.load(Ordering::SeqCst), 0);
    }
}
