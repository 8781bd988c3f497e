//! The transfer supervisor (C6): orchestrates the registry, balancer,
//! health checker, TCP relay and UDP forwarder pair, owns the heartbeat
//! timer, and is the sole owner of every OS resource (listener, UDP
//! sockets, timer) the other components use.
//!
//! Grounded on the teacher's `app::Running` ("poll a bag of futures to
//! completion") and its `app::configure`/`Loader`/`Runner` split between
//! constructing wiring and driving it — generalized here into a struct that
//! owns `JoinHandle`s for each long-lived task instead of polling a
//! `VecDeque` of boxed futures, since this crate spawns true OS threads of
//! work (§5) rather than driving one single-threaded reactor.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::balancer::{Balancer, Registry, Strategy};
use crate::error::{Error, Result};
use crate::events::{self, Event, EventReceiver};
use crate::health::{HealthChecker, Socks5HandshakeChecker};
use crate::relay;
use crate::shared::Shared;
use crate::stats::TransferStats;
use crate::target::{Target, TargetSet};
use crate::udp::{self, UdpForwarderPair};

/// Every construction option named in §6, already resolved to concrete
/// values (callers apply their own defaults before constructing).
pub struct Options {
    pub port: u16,
    pub address: IpAddr,
    pub bind: IpAddr,
    pub strategy: Strategy,
    pub targets: Vec<Target>,
    /// Raw heartbeat values, in milliseconds, unvalidated.
    pub heartbeat: Vec<f64>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            port: 1080,
            address: IpAddr::from([127, 0, 0, 1]),
            bind: IpAddr::from([0, 0, 0, 0]),
            strategy: Strategy::Polling,
            targets: Vec::new(),
            heartbeat: vec![300_000.0],
        }
    }
}

pub struct TransferSupervisor {
    shared: Arc<Shared>,
    checker: Arc<dyn HealthChecker>,
    address: IpAddr,
    configured_port: u16,
    udp_upstream: SocketAddr,
    bound_port: Option<u16>,
    listener_task: Option<JoinHandle<()>>,
    udp: Option<UdpForwarderPair>,
    heartbeat_task: Option<JoinHandle<()>>,
    /// Set once `unlisten` completes. Per §4.4's state machine, CLOSED is
    /// terminal — re-entering LISTENING requires constructing a new
    /// supervisor, so `listen` rejects once this is set.
    closed: bool,
}

impl TransferSupervisor {
    pub fn new(options: Options) -> Result<TransferSupervisor> {
        let schedule = validate_heartbeat(&options.heartbeat)?;

        let balancer = Balancer::new(options.strategy);
        let registry = Registry::new(&options.strategy, TargetSet::from_vec(options.targets));
        let (events, _rx) = events::channel();

        let shared = Arc::new(Shared {
            registry: Mutex::new(registry),
            balancer,
            bind: options.bind,
            stats: TransferStats::new(),
            events,
        });

        let upstream_host: IpAddr = udp::DEFAULT_UPSTREAM.0.parse().expect("default upstream is a valid address");

        let mut supervisor = TransferSupervisor {
            shared,
            checker: Arc::new(Socks5HandshakeChecker::new()),
            address: options.address,
            configured_port: options.port,
            udp_upstream: SocketAddr::new(upstream_host, udp::DEFAULT_UPSTREAM.1),
            bound_port: None,
            listener_task: None,
            udp: None,
            heartbeat_task: None,
            closed: false,
        };
        supervisor.restart_heartbeat(to_durations(&schedule));
        Ok(supervisor)
    }

    /// Swaps in a different health-check oracle (the `shadowChecker`
    /// collaborator contract of §6).
    pub fn with_checker(mut self, checker: Arc<dyn HealthChecker>) -> TransferSupervisor {
        self.checker = checker;
        self
    }

    /// Binds the TCP listener and the UDP forwarder pair. Resolves with the
    /// bound port on success.
    pub async fn listen(&mut self, port: Option<u16>) -> Result<u16> {
        if self.closed {
            return Err(Error::StartFailure(std::io::Error::new(
                std::io::ErrorKind::Other,
                "supervisor is closed; construct a new one to listen again",
            )));
        }
        if self.listener_task.is_some() {
            return Err(Error::StartFailure(std::io::Error::new(std::io::ErrorKind::Other, "already listening")));
        }

        let port = port.unwrap_or(self.configured_port);
        let addr = SocketAddr::new(self.address, port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                Error::PortInUse(port)
            } else {
                Error::StartFailure(e)
            }
        })?;
        let bound = listener.local_addr()?;
        info!("{}: listener bound", bound);

        let udp = UdpForwarderPair::start(bound.port(), self.udp_upstream)
            .await
            .map_err(Error::StartFailure)?;

        self.bound_port = Some(bound.port());
        self.udp = Some(udp);
        self.listener_task = Some(tokio::spawn(relay::run_listener(listener, self.shared.clone())));
        Ok(bound.port())
    }

    /// Closes the listener and ends the UDP sockets. Bounded by a 500ms
    /// wall-clock timeout; never rejects. In-flight sessions are left
    /// running — closing the listener only stops new accepts.
    pub async fn unlisten(&mut self) -> Option<Error> {
        self.closed = true;
        let listener_task = self.listener_task.take();
        let udp = self.udp.take();
        let teardown = async move {
            if let Some(task) = listener_task {
                task.abort();
                let _ = task.await;
            }
            if let Some(udp) = udp {
                udp.end().await;
            }
        };
        match tokio::time::timeout(Duration::from_millis(500), teardown).await {
            Ok(()) => {
                self.bound_port = None;
                None
            }
            Err(_) => Some(Error::UnlistenTimeout),
        }
    }

    /// Stops the health-check timer, then awaits `unlisten`.
    pub async fn stop(&mut self) -> Option<Error> {
        self.stop_health_check();
        self.unlisten().await
    }

    pub fn stop_health_check(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.bound_port
    }

    pub fn push_targets(&self, targets: Vec<Target>) {
        let mut reg = self.shared.registry.lock().expect("registry lock poisoned");
        reg.targets.push(targets);
        self.shared.balancer.reseat(&mut reg);
    }

    pub fn set_targets(&self, targets: Vec<Target>) {
        let mut reg = self.shared.registry.lock().expect("registry lock poisoned");
        reg.targets.set(targets);
        self.shared.balancer.reseat(&mut reg);
    }

    pub fn set_targets_with_filter<F>(&self, pred: F)
    where
        F: FnMut(&Target) -> bool,
    {
        let mut reg = self.shared.registry.lock().expect("registry lock poisoned");
        reg.targets.filter(pred);
        self.shared.balancer.reseat(&mut reg);
    }

    pub fn get_targets(&self) -> Vec<Target> {
        self.shared.registry.lock().expect("registry lock poisoned").targets.snapshot()
    }

    pub fn bytes_transfer(&self) -> u64 {
        self.shared.stats.bytes_transfer()
    }

    pub fn speed(&self) -> String {
        self.shared.stats.speed()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Validates and installs a new heartbeat schedule. Clears the active
    /// timer and re-schedules from the beginning of the new schedule.
    pub fn set_heart_beat(&mut self, values: Vec<f64>) -> Result<()> {
        let schedule = validate_heartbeat(&values)?;
        self.restart_heartbeat(to_durations(&schedule));
        Ok(())
    }

    fn restart_heartbeat(&mut self, schedule: Vec<Duration>) {
        self.stop_health_check();
        let shared = self.shared.clone();
        let checker = self.checker.clone();
        let address = self.address;
        self.heartbeat_task = Some(tokio::spawn(run_heartbeat(schedule, shared, checker, address)));
    }
}

fn validate_heartbeat(values: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(Error::HeartbeatInvalid(0.0));
    }
    for v in values {
        if !v.is_finite() || *v < 5.0 {
            return Err(Error::HeartbeatInvalid(*v));
        }
    }
    Ok(values.to_vec())
}

fn to_durations(values: &[f64]) -> Vec<Duration> {
    values.iter().map(|v| Duration::from_millis(*v as u64)).collect()
}

/// Walks the schedule's prefix as one-shot delays, then switches to a
/// periodic interval of the last element.
async fn run_heartbeat(mut schedule: Vec<Duration>, shared: Arc<Shared>, checker: Arc<dyn HealthChecker>, address: IpAddr) {
    while schedule.len() > 1 {
        let delay = schedule.remove(0);
        tokio::time::sleep(delay).await;
        run_health_check(&shared, &checker, address).await;
    }
    let period = schedule.into_iter().next().unwrap_or(Duration::from_secs(300));
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // the first tick fires immediately; consume it so the first periodic check waits a full period
    loop {
        interval.tick().await;
        run_health_check(&shared, &checker, address).await;
    }
}

/// The two-pass retry pattern of §4.3: run the checker over all targets
/// concurrently, collect the failures, then re-run the checker over just
/// that failed subset once more. Only targets failing both passes are
/// reported (and pruned from the registry, per §1's "prunes unreachable
/// targets").
async fn run_health_check(shared: &Arc<Shared>, checker: &Arc<dyn HealthChecker>, address: IpAddr) {
    let snapshot = {
        let reg = shared.registry.lock().expect("registry lock poisoned");
        reg.targets.snapshot()
    };
    if snapshot.is_empty() {
        return;
    }

    let pass1 = match check_all(&snapshot, checker, address, &shared.events).await {
        Some(failed) => failed,
        None => return,
    };
    if pass1.is_empty() {
        return;
    }

    let pass2 = match check_all(&pass1, checker, address, &shared.events).await {
        Some(failed) => failed,
        None => return,
    };
    if pass2.is_empty() {
        debug!("all pass-1 failures recovered on retry");
        return;
    }

    warn!("health check: {} target(s) failed both passes", pass2.len());
    let _ = shared.events.send(Event::HealthCheckFailed { targets: pass2.clone() });

    let failed_ids: HashSet<u16> = pass2.iter().map(Target::id).collect();
    let mut reg = shared.registry.lock().expect("registry lock poisoned");
    reg.targets.filter(|t| !failed_ids.contains(&t.id()));
    shared.balancer.reseat(&mut reg);
}

/// Runs `checker` over every target concurrently. Returns `None` (and
/// abandons the scan) if the checker itself errors rather than returning a
/// verdict; returns `Some(failures)` otherwise.
async fn check_all(
    targets: &[Target],
    checker: &Arc<dyn HealthChecker>,
    address: IpAddr,
    events: &crate::events::EventSender,
) -> Option<Vec<Target>> {
    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        let checker = checker.clone();
        let target = target.clone();
        let id = target.id();
        handles.push(tokio::spawn(async move {
            let ok = checker.check(address, id).await;
            (target, ok)
        }));
    }

    let mut failed = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((_target, true)) => {}
            Ok((target, false)) => failed.push(target),
            Err(join_err) => {
                warn!("health checker task failed: {}", join_err);
                let _ = events.send(Event::ErrorHealthHeck { message: join_err.to_string() });
                return None;
            }
        }
    }
    Some(failed)
}
