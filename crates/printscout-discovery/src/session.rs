// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery session: the single owner of a printer roster.
//
// A session runs as one Tokio task.  Backend events, capability answers, and
// expiration ticks all arrive as `Command`s on one channel and are handled
// one at a time, so the roster is never touched concurrently.  Subscribers
// receive `RosterEvent`s describing printers to show or hide.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use printscout_core::error::{PrintscoutError, Result};
use printscout_core::{DiscoveredPrinter, DiscoveryConfig, PrinterId};

use crate::backend::{Discovery, DiscoveryListener};
use crate::capabilities::PrinterCapabilities;
use crate::fetcher::CapabilityFetcher;
use crate::known_good::{KNOWN_GOOD_FILE, KnownGoodStore};
use crate::printer::{LocalPrinter, PrinterInfo, PrinterStatus};

/// Roster changes published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    /// Printers to show, or to update if already shown.
    Added(Vec<PrinterInfo>),
    /// Printers to stop showing.
    Removed(Vec<PrinterId>),
}

/// Messages processed by the session task.
#[derive(Debug)]
pub(crate) enum Command {
    Start(Vec<PrinterId>),
    Stop,
    StartTracking(PrinterId),
    StopTracking(PrinterId),
    Found(DiscoveredPrinter),
    Lost(DiscoveredPrinter),
    Capabilities {
        id: PrinterId,
        capabilities: Option<PrinterCapabilities>,
    },
    ExpireTick(u64),
    Destroy(oneshot::Sender<()>),
}

/// Forwards backend events into a session.
///
/// Holds only a weak sender: backends that keep a listener around do not
/// keep a torn-down session alive, and their late events are dropped.
struct SessionListener {
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl SessionListener {
    fn send(&self, command: Command) {
        match self.commands.upgrade() {
            Some(tx) => {
                let _ = tx.send(command);
            }
            None => debug!("session gone; dropping discovery event"),
        }
    }
}

impl DiscoveryListener for SessionListener {
    fn on_found(&self, printer: DiscoveredPrinter) {
        self.send(Command::Found(printer));
    }

    fn on_lost(&self, printer: DiscoveredPrinter) {
        self.send(Command::Lost(printer));
    }
}

/// Handle to a running discovery session.
pub struct DiscoverySession {
    commands: mpsc::UnboundedSender<Command>,
    listener: Arc<dyn DiscoveryListener>,
    task: JoinHandle<()>,
}

impl DiscoverySession {
    /// Spawn a session over `backends`.
    ///
    /// The known-good list is loaded from the configured cache directory.
    /// Returns the session handle and the stream of roster changes.  Must be
    /// called within a Tokio runtime.
    pub fn spawn<F: CapabilityFetcher>(
        fetcher: Arc<F>,
        backends: Vec<Arc<dyn Discovery>>,
        config: &DiscoveryConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RosterEvent>) {
        let known_good = KnownGoodStore::load(
            config.resolved_cache_dir().join(KNOWN_GOOD_FILE),
            config.known_good_capacity,
        );
        let (commands, mut rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let mut state = SessionState::new(
            fetcher,
            backends,
            known_good,
            config.expiration(),
            commands.downgrade(),
            events,
        );
        let listener = Arc::clone(&state.listener);

        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                if !state.handle(command) {
                    return;
                }
            }
            // Every handle is gone without an explicit destroy.
            state.teardown();
        });

        (
            Self {
                commands,
                listener,
                task,
            },
            events_rx,
        )
    }

    /// Begin discovery.  `priority` replaces the set of printers whose
    /// capabilities are fetched eagerly.
    pub fn start(&self, priority: Vec<PrinterId>) -> Result<()> {
        self.send(Command::Start(priority))
    }

    /// Stop discovery.  The roster is kept until the session is destroyed.
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Keep `id` fresh while, for example, a detail view is open.
    pub fn start_tracking(&self, id: PrinterId) -> Result<()> {
        self.send(Command::StartTracking(id))
    }

    pub fn stop_tracking(&self, id: PrinterId) -> Result<()> {
        self.send(Command::StopTracking(id))
    }

    /// The listener this session registers with its backends.  Other event
    /// sources may feed the session through it too.
    pub fn listener(&self) -> Arc<dyn DiscoveryListener> {
        Arc::clone(&self.listener)
    }

    /// Stop discovery, persist the known-good list, and end the session.
    pub async fn destroy(self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Destroy(ack))?;
        done.await.map_err(|_| PrintscoutError::SessionClosed)?;
        drop(self.commands);
        self.task
            .await
            .map_err(|e| PrintscoutError::Discovery(format!("session task failed: {e}")))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PrintscoutError::SessionClosed)
    }
}

/// Everything a session owns.  Only the session task touches it.
pub(crate) struct SessionState<F> {
    fetcher: Arc<F>,
    backends: Vec<Arc<dyn Discovery>>,
    listener: Arc<dyn DiscoveryListener>,
    printers: HashMap<PrinterId, LocalPrinter>,
    priority_ids: HashSet<PrinterId>,
    tracking_ids: HashSet<PrinterId>,
    known_good: KnownGoodStore,
    expiration: Duration,
    expire_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is armed, so stale ticks can be told apart.
    expire_generation: u64,
    commands: mpsc::WeakUnboundedSender<Command>,
    events: mpsc::UnboundedSender<RosterEvent>,
    destroyed: bool,
}

impl<F: CapabilityFetcher> SessionState<F> {
    pub(crate) fn new(
        fetcher: Arc<F>,
        backends: Vec<Arc<dyn Discovery>>,
        known_good: KnownGoodStore,
        expiration: Duration,
        commands: mpsc::WeakUnboundedSender<Command>,
        events: mpsc::UnboundedSender<RosterEvent>,
    ) -> Self {
        let listener: Arc<dyn DiscoveryListener> = Arc::new(SessionListener {
            commands: commands.clone(),
        });
        Self {
            fetcher,
            backends,
            listener,
            printers: HashMap::new(),
            priority_ids: HashSet::new(),
            tracking_ids: HashSet::new(),
            known_good,
            expiration,
            expire_timer: None,
            expire_generation: 0,
            commands,
            events,
            destroyed: false,
        }
    }

    /// Process one command.  Returns false once the session has ended.
    pub(crate) fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start(priority) => self.start(priority),
            Command::Stop => self.stop(),
            Command::StartTracking(id) => self.start_tracking(id),
            Command::StopTracking(id) => {
                self.tracking_ids.remove(&id);
            }
            Command::Found(printer) => self.on_found(printer),
            Command::Lost(printer) => self.on_lost(printer),
            Command::Capabilities { id, capabilities } => self.on_capabilities(id, capabilities),
            Command::ExpireTick(generation) => self.on_expire_tick(generation),
            Command::Destroy(ack) => {
                self.teardown();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self, priority: Vec<PrinterId>) {
        info!(priority = priority.len(), "starting printer discovery");
        self.priority_ids = priority.into_iter().collect();

        // Everything must be seen again; whatever is not will expire.
        for record in self.printers.values_mut() {
            record.not_found();
        }
        self.monitor_expired();

        for backend in &self.backends {
            if let Err(e) = backend.start(Arc::clone(&self.listener)) {
                warn!(error = %e, "discovery backend failed to start");
            }
        }
    }

    fn stop(&mut self) {
        info!("stopping printer discovery");
        for backend in &self.backends {
            backend.stop(&self.listener);
        }
        self.cancel_expire_timer();
    }

    fn start_tracking(&mut self, id: PrinterId) {
        debug!(printer = %id, "start tracking");
        self.tracking_ids.insert(id.clone());
        if self.printers.get(&id).is_some_and(LocalPrinter::is_found) {
            self.request_capabilities(&id, true);
        }
    }

    fn on_found(&mut self, printer: DiscoveredPrinter) {
        if self.destroyed {
            warn!(printer = %printer, "session destroyed; ignoring found printer");
            return;
        }

        let id = printer.id();
        let priority = self.is_priority(&id);
        let record = self
            .printers
            .entry(id.clone())
            .or_insert_with(|| LocalPrinter::new(printer.clone()));
        let new_sighting = record.found(printer);

        if record.capabilities().is_none()
            && let Some(cached) = self.fetcher.cached(record.printer())
        {
            record.set_capabilities(Some(cached));
        }
        let wants_capabilities = record.capabilities().is_none() && (priority || new_sighting);

        self.handle_printer(&id);
        if wants_capabilities {
            self.request_capabilities(&id, false);
        }
    }

    fn on_lost(&mut self, printer: DiscoveredPrinter) {
        if self.destroyed {
            warn!(printer = %printer, "session destroyed; ignoring lost printer");
            return;
        }

        let id = printer.id();
        if id.is_network_address() {
            // Network addresses are not globally unique; another device may
            // answer at this address later.
            self.fetcher.remove(printer.uri());
        }

        let Some(record) = self.printers.get_mut(&id) else {
            return;
        };
        record.not_found();
        self.handle_printer(&id);
        self.monitor_expired();
    }

    fn on_capabilities(&mut self, id: PrinterId, capabilities: Option<PrinterCapabilities>) {
        if self.destroyed {
            return;
        }
        let Some(record) = self.printers.get_mut(&id) else {
            debug!(printer = %id, "capabilities for a printer no longer known");
            return;
        };
        record.end_refresh();
        if capabilities.is_none() {
            debug!(printer = %id, "capability fetch failed");
        }
        record.set_capabilities(capabilities);
        self.handle_printer(&id);
    }

    /// Re-evaluate one record and publish it if it is presentable.
    fn handle_printer(&mut self, id: &PrinterId) {
        let Some(record) = self.printers.get(id) else {
            return;
        };
        let info = if record.capabilities().is_none() && !self.known_good.contains(id) {
            // No capabilities and not known-good: keep it out of sight.
            None
        } else {
            self.known_good.remove(id);
            record.create_info()
        };

        let Some(info) = info else {
            self.unpublish(id);
            return;
        };
        if info.status == PrinterStatus::Idle && record.uuid().is_some() {
            self.known_good.promote(id.clone());
        }
        debug!(
            printer = %id,
            status = ?info.status,
            capabilities = info.capabilities.is_some(),
            "reporting printer"
        );
        if let Some(record) = self.printers.get_mut(id) {
            record.set_published(true);
        }
        self.publish(RosterEvent::Added(vec![info]));
    }

    /// Retract a record that is no longer presentable.  The record itself is
    /// kept until it expires.
    fn unpublish(&mut self, id: &PrinterId) {
        let Some(record) = self.printers.get_mut(id) else {
            return;
        };
        if !record.is_published() {
            return;
        }
        record.set_published(false);
        debug!(printer = %id, "withdrawing printer");
        self.publish(RosterEvent::Removed(vec![id.clone()]));
    }

    fn request_capabilities(&mut self, id: &PrinterId, bypass_cache: bool) {
        let Some(record) = self.printers.get_mut(id) else {
            return;
        };
        if !record.begin_refresh() {
            return;
        }

        let printer = record.printer().clone();
        let fetcher = Arc::clone(&self.fetcher);
        let commands = self.commands.clone();
        let id = id.clone();
        debug!(printer = %id, bypass_cache, "requesting capabilities");
        tokio::spawn(async move {
            let capabilities = fetcher.fetch(&printer, bypass_cache).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::Capabilities { id, capabilities });
            }
        });
    }

    /// Arm the expiration timer unless it is already running or there is
    /// nothing that could expire.
    fn monitor_expired(&mut self) {
        if self.expire_timer.is_some() || self.printers.is_empty() {
            return;
        }
        self.expire_generation += 1;
        let generation = self.expire_generation;
        let deadline = Instant::now() + self.expiration;
        let commands = self.commands.clone();
        self.expire_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::ExpireTick(generation));
            }
        }));
    }

    fn cancel_expire_timer(&mut self) {
        if let Some(timer) = self.expire_timer.take() {
            timer.abort();
        }
    }

    fn on_expire_tick(&mut self, generation: u64) {
        if self.expire_timer.is_none() || generation != self.expire_generation {
            debug!(generation, "ignoring stale expiration tick");
            return;
        }
        self.expire_timer = None;

        let now = Instant::now();
        let expired: Vec<PrinterId> = self
            .printers
            .values()
            .filter(|r| r.is_expired(now, self.expiration))
            .map(|r| r.id().clone())
            .collect();
        for id in &expired {
            debug!(printer = %id, "expiring printer");
            self.printers.remove(id);
        }
        if !expired.is_empty() {
            self.publish(RosterEvent::Removed(expired));
        }

        if self.printers.values().any(|r| !r.is_found()) {
            self.monitor_expired();
        }
    }

    fn is_priority(&self, id: &PrinterId) -> bool {
        self.priority_ids.contains(id) || self.tracking_ids.contains(id)
    }

    fn publish(&self, event: RosterEvent) {
        if self.events.send(event).is_err() {
            debug!("no roster subscriber");
        }
    }

    fn teardown(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop();
        self.destroyed = true;
        self.known_good.save();
        info!(printers = self.printers.len(), "discovery session destroyed");
    }
}
