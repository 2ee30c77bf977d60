// Shared fixtures: a scripted transport and recording subscribers.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use ctrlink_api::transport::{Transport, TransportRequest, TransportResponse};
use ctrlink_core::{
    ConnectCallback, ControllerConfig, ControllerLink, DeviceSubscriber, PanelSubscriber,
    RegistrationCallback, ResponseCode, SensorId, SensoryWidget,
};

pub const BASE_URL: &str = "http://ctrl.test/controller";

// ── Scripted transport ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Timeout,
    /// No answer; fails once the request's own deadline passes.
    Stall,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self::Status(200, body.to_owned())
    }

    pub fn status(code: u16, body: &str) -> Self {
        Self::Status(code, body.to_owned())
    }

    async fn into_result(
        self,
        deadline: Duration,
    ) -> Result<TransportResponse, ctrlink_api::Error> {
        match self {
            Self::Status(code, body) => Ok(TransportResponse::new(code, body)),
            Self::Timeout => Err(ctrlink_api::Error::Timeout { timeout_secs: 5 }),
            Self::Stall => {
                tokio::time::sleep(deadline).await;
                Err(ctrlink_api::Error::Timeout {
                    timeout_secs: deadline.as_secs(),
                })
            }
        }
    }
}

type PollQueue = (
    mpsc::UnboundedSender<Reply>,
    Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Reply>>>,
);

#[derive(Default)]
struct PollCounters {
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: AtomicUsize,
}

struct InFlight {
    counters: Arc<PollCounters>,
    token: String,
}

impl InFlight {
    fn enter(counters: &Arc<PollCounters>, token: &str) -> Self {
        let mut map = counters.in_flight.lock().unwrap();
        let now = map.entry(token.to_owned()).or_default();
        *now += 1;
        counters.max_in_flight.fetch_max(*now, Ordering::SeqCst);
        Self {
            counters: Arc::clone(counters),
            token: token.to_owned(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(n) = self.counters.in_flight.lock().unwrap().get_mut(&self.token) {
            *n -= 1;
        }
    }
}

/// Answers non-poll requests from per-path routes (the last reply for a
/// path repeats) and long-polls from a per-token queue the test feeds.
/// A poll with nothing queued stays in flight.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    polls: Mutex<HashMap<String, PollQueue>>,
    log: Mutex<Vec<String>>,
    deadlines: Mutex<Vec<(String, Duration)>>,
    counters: Arc<PollCounters>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        let transport = Arc::new(Self::default());
        transport.route("rest/servers", Reply::ok(""));
        transport
    }

    /// Replace the replies for `path` (relative to the base URL).
    pub fn route(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_owned(), VecDeque::from([reply]));
    }

    pub fn push_poll(&self, token: &str, reply: Reply) {
        self.poll_queue(token).0.send(reply).unwrap();
    }

    /// Every request so far as `"METHOD path"`.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    /// Deadline of the most recent request whose `"METHOD path"` starts
    /// with `prefix`.
    pub fn last_deadline(&self, prefix: &str) -> Option<Duration> {
        self.deadlines
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(r, _)| r.starts_with(prefix))
            .map(|(_, d)| *d)
    }

    pub fn polls(&self) -> usize {
        self.count("GET rest/polling/")
    }

    pub fn max_polls_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    fn poll_queue(&self, token: &str) -> PollQueue {
        let mut polls = self.polls.lock().unwrap();
        let (tx, rx) = polls.entry(token.to_owned()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            (tx, Arc::new(tokio::sync::Mutex::new(rx)))
        });
        (tx.clone(), Arc::clone(rx))
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Reply::status(404, ""),
        }
    }
}

impl Transport for ScriptedTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, ctrlink_api::Error>> {
        let path = request
            .url
            .path()
            .trim_start_matches("/controller/")
            .to_owned();
        let line = format!("{} {path}", request.method);
        self.log.lock().unwrap().push(line.clone());
        self.deadlines.lock().unwrap().push((line, request.timeout));
        let deadline = request.timeout;

        if let Some(rest) = path.strip_prefix("rest/polling/") {
            let token = rest.split('/').next().unwrap_or_default().to_owned();
            let guard = InFlight::enter(&self.counters, &token);
            let (_, rx) = self.poll_queue(&token);
            return Box::pin(async move {
                let _guard = guard;
                let reply = rx.lock().await.recv().await;
                match reply {
                    Some(reply) => reply.into_result(deadline).await,
                    None => std::future::pending().await,
                }
            });
        }

        let reply = self.next_reply(&path);
        Box::pin(reply.into_result(deadline))
    }
}

// ── Recording callbacks ─────────────────────────────────────────────

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl RegistrationCallback for Recorder {
    fn on_success(&self) {
        self.push("success".into());
    }

    fn on_failure(&self, code: ResponseCode) {
        self.push(format!("failure:{code:?}"));
    }
}

impl ConnectCallback for Recorder {
    fn on_success(&self) {
        self.push("success".into());
    }

    fn on_failure(&self, code: ResponseCode) {
        self.push(format!("failure:{code:?}"));
    }
}

// ── Recording subscribers ───────────────────────────────────────────

pub type ValueLog = Arc<Mutex<Vec<(SensorId, String)>>>;

pub struct TestWidget {
    links: Vec<SensorId>,
    log: ValueLog,
}

impl SensoryWidget for TestWidget {
    fn sensor_links(&self) -> Vec<SensorId> {
        self.links.clone()
    }

    fn set_sensor_value(&self, sensor: SensorId, value: &str) {
        self.log.lock().unwrap().push((sensor, value.to_owned()));
    }
}

pub struct TestPanel {
    pub name: String,
    pub widgets: Vec<Arc<TestWidget>>,
    pub log: ValueLog,
    pub link: Mutex<Option<ControllerLink>>,
}

impl TestPanel {
    /// One widget per entry, each linking to the given sensor ids.
    pub fn new(name: &str, widgets: &[&[i32]]) -> Arc<Self> {
        let log: ValueLog = Arc::default();
        let widgets = widgets
            .iter()
            .map(|links| {
                Arc::new(TestWidget {
                    links: links.iter().copied().map(SensorId).collect(),
                    log: Arc::clone(&log),
                })
            })
            .collect();
        Arc::new(Self {
            name: name.to_owned(),
            widgets,
            log,
            link: Mutex::new(None),
        })
    }

    pub fn values(&self) -> Vec<(SensorId, String)> {
        self.log.lock().unwrap().clone()
    }

    pub fn link(&self) -> Option<ControllerLink> {
        self.link.lock().unwrap().clone()
    }
}

impl PanelSubscriber for TestPanel {
    fn panel_name(&self) -> String {
        self.name.clone()
    }

    fn sensory_widgets(&self) -> Vec<Arc<dyn SensoryWidget>> {
        self.widgets
            .iter()
            .map(|w| Arc::clone(w) as Arc<dyn SensoryWidget>)
            .collect()
    }

    fn set_controller_link(&self, link: Option<ControllerLink>) {
        *self.link.lock().unwrap() = link;
    }
}

pub struct TestDevice {
    pub name: String,
    pub sensors: Vec<SensorId>,
    pub log: ValueLog,
    pub link: Mutex<Option<ControllerLink>>,
}

impl TestDevice {
    pub fn new(name: &str, sensors: &[i32]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            sensors: sensors.iter().copied().map(SensorId).collect(),
            log: Arc::default(),
            link: Mutex::new(None),
        })
    }

    pub fn values(&self) -> Vec<(SensorId, String)> {
        self.log.lock().unwrap().clone()
    }

    pub fn link(&self) -> Option<ControllerLink> {
        self.link.lock().unwrap().clone()
    }
}

impl DeviceSubscriber for TestDevice {
    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn sensor_ids(&self) -> Vec<SensorId> {
        self.sensors.clone()
    }

    fn set_sensor_value(&self, sensor: SensorId, value: &str) {
        self.log.lock().unwrap().push((sensor, value.to_owned()));
    }

    fn set_controller_link(&self, link: Option<ControllerLink>) {
        *self.link.lock().unwrap() = link;
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Config without heartbeat so tests control every request.
pub fn quiet_config() -> ControllerConfig {
    ControllerConfig {
        heartbeat_interval: None,
        ..ControllerConfig::new(BASE_URL)
    }
}

/// Wait (up to 5s) until `check` holds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Give spawned tasks a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
