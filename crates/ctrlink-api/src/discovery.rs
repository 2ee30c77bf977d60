// LAN controller discovery
//
// A run has two halves: a broadcaster that sends a zeroed probe datagram to
// the discovery multicast group with a doubling (capped) interval, and a
// collector that accepts one TCP connection per answering controller and
// reads its announcement. The run loop owns the dedup set; reader tasks
// only hand their result back through the `JoinSet`.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::models::ControllerInfo;

/// Multicast group and port controllers listen on for probes.
pub const DISCOVERY_MULTICAST_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(224, 0, 1, 100), 3333));

/// TCP port controllers answer on unless told otherwise.
pub const DEFAULT_COLLECTOR_PORT: u16 = 2346;

/// Length of a bounded search when the caller does not choose one.
pub const DEFAULT_DISCOVERY_DURATION: Duration = Duration::from_secs(5);

const PROBE_LEN: usize = 512;
const INITIAL_PROBE_INTERVAL: Duration = Duration::from_secs(1);
const MAX_PROBE_INTERVAL: Duration = Duration::from_secs(60);
const RESPONSE_READ_TIMEOUT: Duration = Duration::from_secs(10);

// ── Configuration ────────────────────────────────────────────────────

/// What makes two announcements "the same controller".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupKey {
    /// Identical response bodies.
    #[default]
    ResponseBody,
    /// Same remote IP address.
    RemoteAddr,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Collector port; `0` lets the OS pick one.
    pub tcp_port: u16,
    /// Address the collector binds to.
    pub bind_addr: IpAddr,
    /// `None` runs until stopped.
    pub duration: Option<Duration>,
    pub multicast_target: SocketAddr,
    pub dedup: DedupKey,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            tcp_port: DEFAULT_COLLECTOR_PORT,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            duration: Some(DEFAULT_DISCOVERY_DURATION),
            multicast_target: DISCOVERY_MULTICAST_ADDR,
            dedup: DedupKey::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn new(tcp_port: u16, duration: Option<Duration>) -> Self {
        Self {
            tcp_port,
            duration,
            ..Self::default()
        }
    }
}

/// Lifecycle of one discovery run, in emission order:
/// `Started`, any number of `ControllerFound`, then `Stopped`.
/// A run whose collector cannot bind emits only `StartFailed`.
#[derive(Debug)]
pub enum DiscoveryEvent {
    Started { local_addr: SocketAddr },
    ControllerFound(ControllerInfo),
    Stopped,
    StartFailed(Error),
}

// ── Service ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct RunSlot {
    active: Option<ActiveRun>,
    generation: u64,
}

/// Runs at most one discovery at a time.
///
/// Clones share the same run slot.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryService {
    slot: Arc<Mutex<RunSlot>>,
}

impl DiscoveryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A run stays active until just before its `Stopped` event is sent.
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.active.is_some()
    }

    /// Start a run. Returns `None` (and does nothing) if one is active.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        &self,
        config: DiscoveryConfig,
    ) -> Option<mpsc::UnboundedReceiver<DiscoveryEvent>> {
        let mut slot = self.slot.lock().await;
        if slot.active.is_some() {
            debug!("discovery already running, ignoring start");
            return None;
        }

        slot.generation += 1;
        let generation = slot.generation;
        let cancel = CancellationToken::new();
        slot.active = Some(ActiveRun {
            generation,
            cancel: cancel.clone(),
        });
        drop(slot);

        let (tx, rx) = mpsc::unbounded_channel();
        let service = self.clone();
        tokio::spawn(async move {
            let started = run(config, cancel, &tx).await;
            service.finish(generation).await;
            if started {
                let _ = tx.send(DiscoveryEvent::Stopped);
            }
        });
        Some(rx)
    }

    /// Cancel the active run, if any. Its `Stopped` event follows once the
    /// collector socket is closed.
    pub async fn stop(&self) {
        if let Some(run) = &self.slot.lock().await.active {
            debug!(generation = run.generation, "stopping discovery");
            run.cancel.cancel();
        }
    }

    async fn finish(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.active.as_ref().is_some_and(|r| r.generation == generation) {
            slot.active = None;
        }
    }
}

// ── Run loop ─────────────────────────────────────────────────────────

/// Returns once the run is over, `false` if it never started. A bind
/// failure is reported as `StartFailed` here; the caller emits `Stopped`
/// for runs that started.
async fn run(
    config: DiscoveryConfig,
    cancel: CancellationToken,
    events: &mpsc::UnboundedSender<DiscoveryEvent>,
) -> bool {
    let listener = match bind_collector(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(port = config.tcp_port, error = %e, "discovery collector failed to bind");
            cancel.cancel();
            let _ = events.send(DiscoveryEvent::StartFailed(e));
            return false;
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(source) => {
            cancel.cancel();
            let _ = events.send(DiscoveryEvent::StartFailed(Error::DiscoveryBind {
                port: config.tcp_port,
                source,
            }));
            return false;
        }
    };

    info!(%local_addr, target = %config.multicast_target, "discovery started");
    let _ = events.send(DiscoveryEvent::Started { local_addr });

    let broadcaster = tokio::spawn(broadcast(config.multicast_target, cancel.clone()));
    let deadline = config.duration.map(|d| Instant::now() + d);
    let mut readers: JoinSet<Option<(SocketAddr, String)>> = JoinSet::new();
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = expiry(deadline) => {
                debug!("discovery window elapsed");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(%peer, "discovery response connection");
                    readers.spawn(read_response(stream, peer));
                }
                Err(e) => warn!(error = %e, "discovery accept failed"),
            },
            Some(joined) = readers.join_next() => {
                let Ok(Some((peer, body))) = joined else { continue };
                let key = match config.dedup {
                    DedupKey::ResponseBody => body.clone(),
                    DedupKey::RemoteAddr => peer.ip().to_string(),
                };
                if !seen.insert(key) {
                    trace!(%peer, "duplicate discovery response");
                    continue;
                }
                if let Some(info) = parse_announcement(&body) {
                    info!(%peer, url = %info.url, "controller found");
                    let _ = events.send(DiscoveryEvent::ControllerFound(info));
                }
            }
        }
    }

    cancel.cancel();
    readers.abort_all();
    drop(listener);
    let _ = broadcaster.await;
    info!(found = seen.len(), "discovery stopped");
    true
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn bind_collector(config: &DiscoveryConfig) -> Result<TcpListener, Error> {
    TcpListener::bind((config.bind_addr, config.tcp_port))
        .await
        .map_err(|source| Error::DiscoveryBind {
            port: config.tcp_port,
            source,
        })
}

/// Read one announcement: all lines, terminators stripped, concatenated.
async fn read_response(stream: TcpStream, peer: SocketAddr) -> Option<(SocketAddr, String)> {
    let mut lines = BufReader::new(stream).lines();
    let mut body = String::new();

    let read = timeout(RESPONSE_READ_TIMEOUT, async {
        while let Some(line) = lines.next_line().await? {
            body.push_str(&line);
        }
        Ok::<_, std::io::Error>(())
    })
    .await;

    match read {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "failed to read discovery response");
            return None;
        }
        Err(_) => {
            warn!(%peer, "discovery response read timed out");
            return None;
        }
    }

    let body = body.trim().to_owned();
    if body.is_empty() {
        trace!(%peer, "empty discovery response");
        return None;
    }
    Some((peer, body))
}

/// JSON identity record, or a bare URL from older controllers.
pub fn parse_announcement(body: &str) -> Option<ControllerInfo> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if body.starts_with('{') {
        match serde_json::from_str::<ControllerInfo>(body) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "undecodable discovery announcement");
                None
            }
        }
    } else {
        Some(ControllerInfo::from_url(body))
    }
}

// ── Broadcaster ──────────────────────────────────────────────────────

async fn broadcast(target: SocketAddr, cancel: CancellationToken) {
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = match UdpSocket::bind(local).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(error = %e, "discovery broadcaster could not open a UDP socket");
            return;
        }
    };

    let probe = [0_u8; PROBE_LEN];
    let mut interval = INITIAL_PROBE_INTERVAL;
    loop {
        match socket.send_to(&probe, target).await {
            Ok(_) => trace!(%target, next_in = ?interval, "discovery probe sent"),
            Err(e) => warn!(%target, error = %e, "discovery probe failed"),
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = sleep(interval) => {}
        }
        interval = next_probe_interval(interval);
    }
}

fn next_probe_interval(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_PROBE_INTERVAL)
}
