// ── Registration handles ──
//
// One handle per subscribed panel or device. A handle owns the subscriber's
// sensor id set (derived once), a correlation token used as the long-poll
// session key, and at most one monitoring task. The task takes an initial
// snapshot, then chains long-polls back to back; the controller's hold time
// paces the loop.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use ctrlink_api::{SensorDelta, SensorId};

use crate::connector::Connector;
use crate::error::CoreError;
use crate::subscriber::{ControllerLink, DeviceSubscriber, PanelSubscriber, RegistrationCallback};

// ── Keys & targets ───────────────────────────────────────────────────

/// Identity of a subscriber in the session's registration map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriberKey {
    Panel(String),
    Device(String),
}

impl fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panel(name) => write!(f, "panel {name:?}"),
            Self::Device(name) => write!(f, "device {name:?}"),
        }
    }
}

#[derive(Clone)]
pub(crate) enum Target {
    Panel(Arc<dyn PanelSubscriber>),
    Device(Arc<dyn DeviceSubscriber>),
}

impl Target {
    pub(crate) fn key(&self) -> SubscriberKey {
        match self {
            Self::Panel(panel) => SubscriberKey::Panel(panel.panel_name()),
            Self::Device(device) => SubscriberKey::Device(device.device_name()),
        }
    }

    /// Deduplicated, ordered sensor ids.
    fn derive_sensor_ids(&self) -> Vec<SensorId> {
        let ids: BTreeSet<SensorId> = match self {
            Self::Panel(panel) => panel
                .sensory_widgets()
                .iter()
                .flat_map(|w| w.sensor_links())
                .collect(),
            Self::Device(device) => device.sensor_ids().into_iter().collect(),
        };
        ids.into_iter().collect()
    }

    /// Push every changed value to every link that references it. A device
    /// only hears about the ids in `ids`.
    fn apply(&self, ids: &[SensorId], delta: &SensorDelta) {
        match self {
            Self::Panel(panel) => {
                let widgets = panel.sensory_widgets();
                for (sensor, value) in delta {
                    for widget in &widgets {
                        for link in widget.sensor_links() {
                            if link == *sensor {
                                widget.set_sensor_value(*sensor, value);
                            }
                        }
                    }
                }
            }
            Self::Device(device) => {
                for (sensor, value) in delta {
                    if ids.binary_search(sensor).is_ok() {
                        device.set_sensor_value(*sensor, value);
                    } else {
                        trace!(%sensor, "ignoring value for unmonitored sensor");
                    }
                }
            }
        }
    }

    fn set_link(&self, link: Option<ControllerLink>) {
        match self {
            Self::Panel(panel) => panel.set_controller_link(link),
            Self::Device(device) => device.set_controller_link(link),
        }
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// A subscriber's interest in a set of sensors.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RegistrationHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    key: SubscriberKey,
    target: Target,
    token: Uuid,
    sensor_ids: OnceLock<Vec<SensorId>>,
    callback: Arc<dyn RegistrationCallback>,
    /// Monitoring is wanted. Cleared on disconnect and unregister.
    active: AtomicBool,
    /// Cleared only on unregister.
    registered: Arc<AtomicBool>,
    /// The success callback has fired.
    announced: AtomicBool,
    task: Mutex<Option<MonitorTask>>,
}

struct MonitorTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("key", &self.inner.key)
            .field("token", &self.inner.token)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl RegistrationHandle {
    pub(crate) fn new(target: Target, callback: Arc<dyn RegistrationCallback>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                key: target.key(),
                target,
                token: Uuid::new_v4(),
                sensor_ids: OnceLock::new(),
                callback,
                active: AtomicBool::new(false),
                registered: Arc::new(AtomicBool::new(true)),
                announced: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn key(&self) -> &SubscriberKey {
        &self.inner.key
    }

    /// Long-poll session key.
    pub fn token(&self) -> Uuid {
        self.inner.token
    }

    /// The subscriber's sensor ids, derived on first use.
    pub fn sensor_ids(&self) -> &[SensorId] {
        self.inner.sensor_ids()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::Acquire)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// (Re)start monitoring: snapshot, success notice on the first
    /// successful activation only, then the poll loop.
    pub(crate) async fn activate(&self, connector: &Arc<Connector>) {
        if !self.is_registered() {
            return;
        }
        let mut task = self.inner.task.lock().await;
        if let Some(old) = task.take() {
            old.cancel.cancel();
            let _ = old.join.await;
        }
        // An unregister may have started while we waited for the lock.
        if !self.is_registered() {
            return;
        }

        self.inner.active.store(true, Ordering::Release);
        self.inner.target.set_link(Some(ControllerLink::new(
            Arc::clone(connector),
            Arc::clone(&self.inner.registered),
        )));

        let cancel = CancellationToken::new();
        let join = tokio::spawn(monitor(
            Arc::clone(&self.inner),
            Arc::clone(connector),
            cancel.clone(),
        ));
        *task = Some(MonitorTask { cancel, join });
    }

    /// Stop monitoring but stay registered.
    pub(crate) async fn deactivate(&self) {
        self.inner.active.store(false, Ordering::Release);
        let old = {
            let mut task = self.inner.task.lock().await;
            // Again under the lock: an activate that held it may have set it.
            self.inner.active.store(false, Ordering::Release);
            task.take()
        };
        if let Some(old) = old {
            old.cancel.cancel();
            let _ = old.join.await;
        }
    }

    /// End the registration and send the `Unregistered` notice.
    pub(crate) async fn unregister(&self) {
        self.inner.registered.store(false, Ordering::Release);
        self.deactivate().await;
        self.inner.target.set_link(None);
        debug!(key = %self.inner.key, "unregistered");
        self.inner
            .callback
            .on_failure(ctrlink_api::ResponseCode::Unregistered);
    }
}

impl HandleInner {
    fn sensor_ids(&self) -> &[SensorId] {
        self.sensor_ids.get_or_init(|| self.target.derive_sensor_ids())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

// ── Monitoring loop ──────────────────────────────────────────────────

async fn monitor(handle: Arc<HandleInner>, connector: Arc<Connector>, cancel: CancellationToken) {
    let ids = handle.sensor_ids().to_vec();
    let token = handle.token.to_string();
    debug!(key = %handle.key, sensor_count = ids.len(), %token, "monitoring started");

    if !ids.is_empty() {
        let snapshot = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = snapshot(&connector, &ids) => result,
        };
        match snapshot {
            Ok(delta) => {
                if !handle.is_active() {
                    return;
                }
                trace!(key = %handle.key, changed = delta.len(), "initial snapshot");
                handle.target.apply(&ids, &delta);
            }
            Err(e) => {
                warn!(key = %handle.key, error = %e, "initial snapshot failed");
                handle.callback.on_failure(e.response_code());
                return;
            }
        }
    }

    if !handle.announced.swap(true, Ordering::AcqRel) {
        handle.callback.on_success();
    }

    if ids.is_empty() {
        debug!(key = %handle.key, "no sensors to monitor");
        return;
    }

    loop {
        if cancel.is_cancelled() || !handle.is_active() || !connector.is_connected() {
            break;
        }
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = poll(&connector, &token, &ids) => result,
        };
        match polled {
            Ok(delta) if delta.is_empty() => trace!(key = %handle.key, "no change"),
            Ok(delta) => {
                if !handle.is_active() {
                    break;
                }
                trace!(key = %handle.key, changed = delta.len(), "poll delta");
                handle.target.apply(&ids, &delta);
            }
            Err(e) => {
                warn!(key = %handle.key, error = %e, "poll failed, monitoring idle");
                handle.callback.on_failure(e.response_code());
                break;
            }
        }
    }
    debug!(key = %handle.key, "monitoring stopped");
}

async fn snapshot(connector: &Connector, ids: &[SensorId]) -> Result<SensorDelta, CoreError> {
    Ok(connector.client()?.sensor_values(ids).await?)
}

async fn poll(connector: &Connector, token: &str, ids: &[SensorId]) -> Result<SensorDelta, CoreError> {
    Ok(connector.client()?.poll_sensors(token, ids).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::subscriber::SensoryWidget;

    struct Widget {
        links: Vec<SensorId>,
        seen: StdMutex<Vec<(SensorId, String)>>,
    }

    impl SensoryWidget for Widget {
        fn sensor_links(&self) -> Vec<SensorId> {
            self.links.clone()
        }

        fn set_sensor_value(&self, sensor: SensorId, value: &str) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((sensor, value.to_owned()));
            }
        }
    }

    struct Panel(Vec<Arc<Widget>>);

    impl PanelSubscriber for Panel {
        fn panel_name(&self) -> String {
            "Lounge".into()
        }

        fn sensory_widgets(&self) -> Vec<Arc<dyn SensoryWidget>> {
            self.0
                .iter()
                .map(|w| Arc::clone(w) as Arc<dyn SensoryWidget>)
                .collect()
        }
    }

    fn widget(links: &[i32]) -> Arc<Widget> {
        Arc::new(Widget {
            links: links.iter().copied().map(SensorId).collect(),
            seen: StdMutex::new(Vec::new()),
        })
    }

    #[test]
    fn panel_ids_are_deduplicated() {
        let target = Target::Panel(Arc::new(Panel(vec![widget(&[2, 1]), widget(&[1, 3])])));
        assert_eq!(
            target.derive_sensor_ids(),
            vec![SensorId(1), SensorId(2), SensorId(3)]
        );
        assert_eq!(target.key(), SubscriberKey::Panel("Lounge".into()));
    }

    #[test]
    fn one_id_fans_out_to_every_link() {
        let a = widget(&[1]);
        let b = widget(&[1, 2]);
        let target = Target::Panel(Arc::new(Panel(vec![Arc::clone(&a), Arc::clone(&b)])));

        let delta: SensorDelta = [(SensorId(1), "on".to_string())].into_iter().collect();
        target.apply(&target.derive_sensor_ids(), &delta);

        let seen_a = a.seen.lock().map(|s| s.clone()).unwrap_or_default();
        let seen_b = b.seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen_a, vec![(SensorId(1), "on".to_string())]);
        assert_eq!(seen_b, vec![(SensorId(1), "on".to_string())]);
    }

    struct Device {
        ids: Vec<SensorId>,
        seen: StdMutex<Vec<(SensorId, String)>>,
    }

    impl DeviceSubscriber for Device {
        fn device_name(&self) -> String {
            "Boiler".into()
        }

        fn sensor_ids(&self) -> Vec<SensorId> {
            self.ids.clone()
        }

        fn set_sensor_value(&self, sensor: SensorId, value: &str) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((sensor, value.to_owned()));
            }
        }
    }

    #[test]
    fn device_only_hears_its_own_sensors() {
        let device = Arc::new(Device {
            ids: vec![SensorId(4), SensorId(2)],
            seen: StdMutex::new(Vec::new()),
        });
        let target = Target::Device(Arc::clone(&device) as Arc<dyn DeviceSubscriber>);

        let delta: SensorDelta = [
            (SensorId(2), "21.5".to_string()),
            (SensorId(9), "stray".to_string()),
        ]
        .into_iter()
        .collect();
        target.apply(&target.derive_sensor_ids(), &delta);

        let seen = device.seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, vec![(SensorId(2), "21.5".to_string())]);
    }
}
