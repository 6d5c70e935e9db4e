// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::engine::ConnectionEngine;
use crate::event::{ConsumerStatus, DeviceUpdate, EngineEvent, LogLevel};
use crate::mux::consumer::{Consumer, ConsumerId};
use crate::mux::registry::Registry;
use crate::mux::shutdown::{Completion, ShutdownCoordinator};
use crate::mux::state::ConnectionState;
use crate::protocol::Command;

/// Snapshot of the multiplexer, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxStats {
    pub consumers: usize,
    pub state: ConnectionState,
    pub pending_completions: usize,
    pub closing: bool,
}

/// Shares one engine connection among any number of consumers.
///
/// The engine is connected when the first consumer registers and torn down
/// when the last one leaves or `close` is called. All methods are
/// synchronous; the [`Controller`](crate::mux::Controller) task owns the
/// multiplexer and feeds it requests and engine events one at a time.
pub struct Multiplexer<E: ConnectionEngine> {
    engine: E,
    label: String,
    registry: Registry,
    state: ConnectionState,
    shutdown: ShutdownCoordinator,
    // Last consumer left while a connect was in flight
    disconnect_deferred: bool,
    // A consumer registered while a teardown was in flight
    reconnect_deferred: bool,
}

impl<E: ConnectionEngine> Multiplexer<E> {
    /// `label` names the connection in logs, usually `host:port`.
    pub fn new(engine: E, label: impl Into<String>) -> Self {
        Self {
            engine,
            label: label.into(),
            registry: Registry::new(),
            state: ConnectionState::Idle,
            shutdown: ShutdownCoordinator::new(),
            disconnect_deferred: false,
            reconnect_deferred: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn stats(&self) -> MuxStats {
        MuxStats {
            consumers: self.registry.len(),
            state: self.state,
            pending_completions: self.shutdown.pending_len(),
            closing: self.shutdown.is_closing(),
        }
    }

    /// Add or replace a consumer. The first consumer starts the connection.
    pub fn register(&mut self, consumer: Arc<dyn Consumer>) {
        let was_empty = self.registry.is_empty();
        let id = consumer.id().clone();
        if self.registry.insert(consumer.clone()).is_some() {
            debug!("Replaced consumer {}", id);
        } else {
            debug!("Registered consumer {} ({} total)", id, self.registry.len());
        }

        if !was_empty {
            return;
        }

        match self.state {
            ConnectionState::Closed => {
                debug!("Consumer {} registered after close; not connecting", id);
                consumer.status(ConsumerStatus::Disconnected);
            }
            ConnectionState::Disconnecting if self.shutdown.is_closing() => {
                consumer.status(ConsumerStatus::Disconnected);
            }
            ConnectionState::Disconnecting => {
                debug!("Teardown in flight; reconnecting once it completes");
                self.reconnect_deferred = true;
                consumer.status(ConsumerStatus::Connecting);
            }
            ConnectionState::Connecting if self.disconnect_deferred => {
                // The connection is wanted again before the deferred teardown ran
                debug!("Cancelling deferred disconnect");
                self.disconnect_deferred = false;
                self.shutdown.resolve_all();
                consumer.status(ConsumerStatus::Connecting);
            }
            ConnectionState::Idle => {
                info!("Connecting to {}", self.label);
                self.transition(ConnectionState::Connecting);
                consumer.status(ConsumerStatus::Connecting);
                self.engine.connect();
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                warn!("Empty registry while {}; leaving connection as is", self.state);
            }
        }
    }

    /// Remove a consumer. `done` fires once the consumer's share of the
    /// connection is released: immediately if others remain, otherwise when
    /// the teardown it triggered completes.
    pub fn deregister(&mut self, id: &ConsumerId, done: Completion) {
        let removed = self.registry.remove(id);
        if removed {
            debug!("Deregistered consumer {} ({} left)", id, self.registry.len());
        } else {
            debug!("Consumer {} was not registered", id);
        }

        if !removed || !self.registry.is_empty() || self.shutdown.is_closing() {
            done.fire();
            return;
        }

        match self.state {
            ConnectionState::Idle | ConnectionState::Connected => self.begin_disconnect(done),
            ConnectionState::Connecting => {
                debug!("Last consumer left while connecting; deferring disconnect");
                self.disconnect_deferred = true;
                self.shutdown.push(done);
            }
            ConnectionState::Disconnecting => {
                self.reconnect_deferred = false;
                self.shutdown.push(done);
            }
            ConnectionState::Closed => done.fire(),
        }
    }

    /// Tear down the connection regardless of consumers. Terminal: no
    /// further connects happen. `done` fires when the teardown completes.
    pub fn close(&mut self, done: Completion) {
        if self.state == ConnectionState::Closed {
            done.fire();
            return;
        }

        info!("Closing connection to {}", self.label);
        self.shutdown.begin_close();
        self.reconnect_deferred = false;
        self.disconnect_deferred = false;

        if self.state == ConnectionState::Disconnecting {
            self.shutdown.push(done);
        } else {
            self.begin_disconnect(done);
        }
    }

    /// Fire every completion still waiting for a teardown that can no
    /// longer arrive, e.g. because the engine's event stream has ended.
    pub fn release_pending(&mut self) -> usize {
        let fired = self.shutdown.resolve_all();
        if fired > 0 {
            warn!("{}: released {} completions without a disconnect", self.label, fired);
        }
        fired
    }

    /// Forward a command to the engine. The engine decides what to do
    /// when no session is up.
    pub fn send_command(&mut self, command: Command) {
        if self.state != ConnectionState::Connected {
            debug!("Sending {} while {}", command.code(), self.state);
        }
        self.engine.send_command(command);
    }

    /// React to one engine event.
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Connected => self.on_connected(),
            EngineEvent::Error(text) => self.on_error(&text),
            EngineEvent::Disconnect => {
                info!("Disconnected from {}", self.label);
                self.complete_teardown();
            }
            EngineEvent::Log(level, text) => match level {
                LogLevel::Debug => debug!("{}", text),
                LogLevel::Warn => warn!("{}", text),
                LogLevel::Error => error!("{}", text),
            },
            EngineEvent::Update(update) => self.broadcast_update(&update),
        }
    }

    fn on_connected(&mut self) {
        match self.state {
            ConnectionState::Connecting => {}
            ConnectionState::Connected => return,
            other => {
                warn!("Ignoring connected event while {}", other);
                return;
            }
        }

        info!("Connected to {}", self.label);
        self.transition(ConnectionState::Connected);

        if self.disconnect_deferred {
            self.disconnect_deferred = false;
            self.start_teardown();
            return;
        }
        self.broadcast_status(ConsumerStatus::Connected);
    }

    fn on_error(&mut self, text: &str) {
        warn!("Connection to {} failed: {}", self.label, text);
        self.broadcast_status(ConsumerStatus::Disconnected);

        match self.state {
            // The engine may retry on its own
            ConnectionState::Connected => self.transition(ConnectionState::Connecting),
            ConnectionState::Connecting if self.disconnect_deferred => {
                self.disconnect_deferred = false;
                self.start_teardown();
            }
            _ => {}
        }
    }

    fn begin_disconnect(&mut self, done: Completion) {
        self.shutdown.push(done);
        self.start_teardown();
    }

    fn start_teardown(&mut self) {
        self.transition(ConnectionState::Disconnecting);
        if self.engine.disconnect() {
            debug!("Engine had no session to tear down");
            self.complete_teardown();
        }
    }

    fn complete_teardown(&mut self) {
        self.disconnect_deferred = false;
        let fired = self.shutdown.resolve_all();
        if fired > 0 {
            debug!("Resolved {} pending completion(s)", fired);
        }
        self.broadcast_status(ConsumerStatus::Disconnected);

        if self.shutdown.is_closing() {
            self.transition(ConnectionState::Closed);
            return;
        }
        self.transition(ConnectionState::Idle);

        if std::mem::take(&mut self.reconnect_deferred) && !self.registry.is_empty() {
            info!("Reconnecting to {}", self.label);
            self.transition(ConnectionState::Connecting);
            self.engine.connect();
        }
    }

    fn broadcast_status(&self, status: ConsumerStatus) {
        for consumer in self.registry.iter() {
            consumer.status(status);
        }
    }

    fn broadcast_update(&self, update: &DeviceUpdate) {
        for consumer in self.registry.iter() {
            consumer.update(update);
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        assert!(
            self.state.can_transition_to(next),
            "illegal connection transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::devices::zone::ZoneState;
    use crate::devices::{ZoneEvent, ZoneStatusFlags, ZoneUpdate};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Connect,
        Disconnect,
        Send(String),
    }

    /// Records calls; `disconnect()` answers `sync_disconnect`.
    #[derive(Default)]
    pub struct RecordingEngine {
        pub calls: Vec<Call>,
        pub sync_disconnect: bool,
    }

    impl RecordingEngine {
        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }
    }

    impl ConnectionEngine for RecordingEngine {
        fn connect(&mut self) {
            self.calls.push(Call::Connect);
        }

        fn disconnect(&mut self) -> bool {
            self.calls.push(Call::Disconnect);
            self.sync_disconnect
        }

        fn send_command(&mut self, command: Command) {
            self.calls.push(Call::Send(command.to_wire_string()));
        }

        fn next_event(&mut self) -> impl Future<Output = Option<EngineEvent>> + Send {
            std::future::pending()
        }
    }

    #[derive(Default)]
    pub struct Probe {
        id: Option<ConsumerId>,
        pub statuses: Mutex<Vec<ConsumerStatus>>,
        pub updates: Mutex<Vec<DeviceUpdate>>,
    }

    impl Probe {
        pub fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: Some(ConsumerId::new(id)),
                ..Default::default()
            })
        }

        pub fn last_status(&self) -> Option<ConsumerStatus> {
            self.statuses.lock().unwrap().last().copied()
        }
    }

    impl Consumer for Probe {
        fn id(&self) -> &ConsumerId {
            self.id.as_ref().unwrap()
        }

        fn status(&self, status: ConsumerStatus) {
            self.statuses.lock().unwrap().push(status);
        }

        fn update(&self, update: &DeviceUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }
    }

    fn mux() -> Multiplexer<RecordingEngine> {
        Multiplexer::new(RecordingEngine::default(), "panel:4025")
    }

    fn counter() -> (Arc<AtomicUsize>, Completion) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Completion::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn zone_update(initial: bool) -> DeviceUpdate {
        let flags = ZoneStatusFlags::OPEN;
        DeviceUpdate::Zone(ZoneUpdate {
            zone: 4,
            partition: None,
            code: 609,
            event: ZoneEvent::Open,
            status: ZoneState::from(flags),
            initial_update: initial,
        })
    }

    #[test]
    fn test_first_register_connects() {
        let mut mux = mux();
        let a = Probe::new("a");
        mux.register(a.clone());

        assert_eq!(mux.engine().calls, vec![Call::Connect]);
        assert_eq!(mux.state(), ConnectionState::Connecting);
        assert_eq!(a.last_status(), Some(ConsumerStatus::Connecting));

        let b = Probe::new("b");
        mux.register(b.clone());
        assert_eq!(mux.engine().count(&Call::Connect), 1);
        assert!(b.statuses.lock().unwrap().is_empty());

        mux.handle_event(EngineEvent::Connected);
        assert_eq!(mux.state(), ConnectionState::Connected);
        assert_eq!(a.last_status(), Some(ConsumerStatus::Connected));
        assert_eq!(b.last_status(), Some(ConsumerStatus::Connected));
    }

    #[test]
    fn test_updates_fan_out_to_every_consumer() {
        let mut mux = mux();
        let a = Probe::new("a");
        let b = Probe::new("b");
        mux.register(a.clone());
        mux.register(b.clone());
        mux.handle_event(EngineEvent::Connected);

        mux.handle_event(EngineEvent::Update(zone_update(true)));
        mux.handle_event(EngineEvent::Update(zone_update(false)));

        assert_eq!(a.updates.lock().unwrap().len(), 2);
        assert_eq!(b.updates.lock().unwrap().len(), 2);
        assert!(a.updates.lock().unwrap()[0].is_initial());
    }

    #[test]
    fn test_last_consumer_leaving_disconnects() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        mux.register(Probe::new("b"));
        mux.handle_event(EngineEvent::Connected);

        let (first, done) = counter();
        mux.deregister(&ConsumerId::new("a"), done);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(mux.engine().count(&Call::Disconnect), 0);

        let (last, done) = counter();
        mux.deregister(&ConsumerId::new("b"), done);
        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
        assert_eq!(mux.state(), ConnectionState::Disconnecting);
        assert_eq!(last.load(Ordering::SeqCst), 0);

        mux.handle_event(EngineEvent::Disconnect);
        assert_eq!(last.load(Ordering::SeqCst), 1);
        assert_eq!(mux.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_reregister_after_teardown_reconnects() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        mux.handle_event(EngineEvent::Connected);
        mux.deregister(&ConsumerId::new("a"), Completion::noop());
        mux.handle_event(EngineEvent::Disconnect);

        mux.register(Probe::new("a"));
        assert_eq!(
            mux.engine().calls,
            vec![Call::Connect, Call::Disconnect, Call::Connect]
        );
        assert_eq!(mux.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_register_during_teardown_defers_connect() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        mux.handle_event(EngineEvent::Connected);
        mux.deregister(&ConsumerId::new("a"), Completion::noop());

        let b = Probe::new("b");
        mux.register(b.clone());
        assert_eq!(mux.engine().count(&Call::Connect), 1);
        assert_eq!(b.last_status(), Some(ConsumerStatus::Connecting));

        mux.handle_event(EngineEvent::Disconnect);
        assert_eq!(mux.engine().count(&Call::Connect), 2);
        assert_eq!(mux.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_close_with_consumers() {
        let mut mux = mux();
        let a = Probe::new("a");
        mux.register(a.clone());
        mux.handle_event(EngineEvent::Connected);

        let (closed, done) = counter();
        mux.close(done);
        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        mux.handle_event(EngineEvent::Disconnect);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(mux.state(), ConnectionState::Closed);
        assert_eq!(a.last_status(), Some(ConsumerStatus::Disconnected));

        // No reconnects once closed
        mux.register(Probe::new("b"));
        mux.deregister(&ConsumerId::new("a"), Completion::noop());
        mux.deregister(&ConsumerId::new("b"), Completion::noop());
        mux.register(Probe::new("c"));
        assert_eq!(mux.engine().count(&Call::Connect), 1);
        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
    }

    #[test]
    fn test_close_when_engine_already_idle() {
        let mut mux = Multiplexer::new(
            RecordingEngine {
                sync_disconnect: true,
                ..Default::default()
            },
            "panel:4025",
        );

        let (closed, done) = counter();
        mux.close(done);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(mux.state(), ConnectionState::Closed);

        let (again, done) = counter();
        mux.close(done);
        assert_eq!(again.load(Ordering::SeqCst), 1);
        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
    }

    #[test]
    fn test_close_racing_deregister_fires_both() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        mux.handle_event(EngineEvent::Connected);

        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        mux.deregister(
            &ConsumerId::new("a"),
            Completion::new(move || o.lock().unwrap().push("deregister")),
        );
        let o = order.clone();
        mux.close(Completion::new(move || o.lock().unwrap().push("close")));

        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
        assert!(order.lock().unwrap().is_empty());

        mux.handle_event(EngineEvent::Disconnect);
        assert_eq!(*order.lock().unwrap(), vec!["deregister", "close"]);
        assert_eq!(mux.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_deregister_while_connecting_waits_for_connect() {
        let mut mux = mux();
        mux.register(Probe::new("a"));

        let (left, done) = counter();
        mux.deregister(&ConsumerId::new("a"), done);
        assert_eq!(mux.engine().count(&Call::Disconnect), 0);
        assert_eq!(mux.stats().pending_completions, 1);

        mux.handle_event(EngineEvent::Connected);
        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
        assert_eq!(mux.state(), ConnectionState::Disconnecting);

        mux.handle_event(EngineEvent::Disconnect);
        assert_eq!(left.load(Ordering::SeqCst), 1);
        assert_eq!(mux.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_deferred_disconnect_after_failed_connect() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        mux.deregister(&ConsumerId::new("a"), Completion::noop());

        mux.handle_event(EngineEvent::Error("connection refused".into()));
        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
        assert_eq!(mux.state(), ConnectionState::Disconnecting);
    }

    #[test]
    fn test_register_cancels_deferred_disconnect() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        let (left, done) = counter();
        mux.deregister(&ConsumerId::new("a"), done);

        mux.register(Probe::new("b"));
        assert_eq!(left.load(Ordering::SeqCst), 1);

        mux.handle_event(EngineEvent::Connected);
        assert_eq!(mux.state(), ConnectionState::Connected);
        assert_eq!(mux.engine().count(&Call::Disconnect), 0);
        assert_eq!(mux.engine().count(&Call::Connect), 1);
    }

    #[test]
    fn test_close_while_connecting_disconnects_immediately() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        mux.close(Completion::noop());
        assert_eq!(mux.engine().calls, vec![Call::Connect, Call::Disconnect]);

        // A late connected event does not revive the connection
        mux.handle_event(EngineEvent::Connected);
        assert_eq!(mux.state(), ConnectionState::Disconnecting);
        mux.handle_event(EngineEvent::Disconnect);
        assert_eq!(mux.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_deregister_unknown_is_noop() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        let (done_count, done) = counter();
        mux.deregister(&ConsumerId::new("ghost"), done);
        assert_eq!(done_count.load(Ordering::SeqCst), 1);
        assert_eq!(mux.engine().count(&Call::Disconnect), 0);
        assert_eq!(mux.stats().consumers, 1);

        // Second deregistration of the same consumer is also a no-op
        mux.handle_event(EngineEvent::Connected);
        mux.deregister(&ConsumerId::new("a"), Completion::noop());
        mux.handle_event(EngineEvent::Disconnect);
        mux.deregister(&ConsumerId::new("a"), Completion::noop());
        assert_eq!(mux.engine().count(&Call::Disconnect), 1);
    }

    #[test]
    fn test_replacing_consumer_keeps_single_entry() {
        let mut mux = mux();
        let first = Probe::new("a");
        let second = Probe::new("a");
        mux.register(first.clone());
        mux.register(second.clone());
        assert_eq!(mux.stats().consumers, 1);
        assert_eq!(mux.engine().count(&Call::Connect), 1);

        mux.handle_event(EngineEvent::Connected);
        assert_eq!(second.last_status(), Some(ConsumerStatus::Connected));
        assert_eq!(first.last_status(), Some(ConsumerStatus::Connecting));
    }

    #[test]
    fn test_error_marks_consumers_disconnected() {
        let mut mux = mux();
        let a = Probe::new("a");
        mux.register(a.clone());
        mux.handle_event(EngineEvent::Connected);

        mux.handle_event(EngineEvent::Error("Connection reset by peer".into()));
        assert_eq!(a.last_status(), Some(ConsumerStatus::Disconnected));
        assert_eq!(mux.state(), ConnectionState::Connecting);

        // Engine reconnects by itself
        mux.handle_event(EngineEvent::Connected);
        assert_eq!(a.last_status(), Some(ConsumerStatus::Connected));
        assert_eq!(mux.engine().count(&Call::Connect), 1);
    }

    #[test]
    fn test_departed_consumer_receives_nothing_more() {
        let mut mux = mux();
        let a = Probe::new("a");
        let b = Probe::new("b");
        mux.register(a.clone());
        mux.register(b.clone());
        mux.handle_event(EngineEvent::Connected);

        let (done, completion) = counter();
        mux.deregister(&ConsumerId::new("a"), completion);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        let a_statuses = a.statuses.lock().unwrap().len();

        mux.handle_event(EngineEvent::Update(zone_update(false)));
        mux.handle_event(EngineEvent::Error("Connection reset by peer".into()));

        assert!(a.updates.lock().unwrap().is_empty());
        assert_eq!(a.statuses.lock().unwrap().len(), a_statuses);
        assert_eq!(b.updates.lock().unwrap().len(), 1);
        assert_eq!(b.last_status(), Some(ConsumerStatus::Disconnected));
    }

    #[test]
    fn test_release_pending_fires_stranded_completions() {
        let mut mux = mux();
        mux.register(Probe::new("a"));
        mux.handle_event(EngineEvent::Connected);

        let (left, done) = counter();
        mux.deregister(&ConsumerId::new("a"), done);
        let (closed, done) = counter();
        mux.close(done);
        assert_eq!(mux.stats().pending_completions, 2);

        assert_eq!(mux.release_pending(), 2);
        assert_eq!(left.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(mux.release_pending(), 0);
    }

    #[test]
    fn test_unexpected_disconnect_returns_to_idle() {
        let mut mux = mux();
        let a = Probe::new("a");
        mux.register(a.clone());
        mux.handle_event(EngineEvent::Connected);
        mux.handle_event(EngineEvent::Disconnect);

        assert_eq!(mux.state(), ConnectionState::Idle);
        assert_eq!(a.last_status(), Some(ConsumerStatus::Disconnected));
        assert_eq!(mux.stats().pending_completions, 0);
    }

    #[test]
    fn test_send_command_passes_through() {
        let mut mux = mux();
        mux.send_command(Command::Poll);
        mux.register(Probe::new("a"));
        mux.handle_event(EngineEvent::Connected);
        mux.send_command(Command::StatusReport);

        assert_eq!(
            mux.engine().calls,
            vec![
                Call::Send("00090\r\n".into()),
                Call::Connect,
                Call::Send("00191\r\n".into()),
            ]
        );
    }

    #[test]
    fn test_random_churn_keeps_invariants() {
        let mut mux = mux();
        let ids = ["a", "b", "c"];
        let mut model = std::collections::HashSet::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut issued = 0;

        let mut seen_calls = 0;
        let mut session_open = false;
        let mut awaiting_connect = false;
        let mut awaiting_disconnect = false;

        let mut seed: u32 = 0x2545_f491;
        let mut rand = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..2000 {
            let roll = rand();
            let id = ids[(roll as usize / 8) % ids.len()];
            match roll % 6 {
                0 | 1 => {
                    mux.register(Probe::new(id));
                    model.insert(id);
                }
                2 | 3 => {
                    let f = fired.clone();
                    mux.deregister(
                        &ConsumerId::new(id),
                        Completion::new(move || {
                            f.fetch_add(1, Ordering::SeqCst);
                        }),
                    );
                    issued += 1;
                    model.remove(id);
                }
                4 if awaiting_connect && !awaiting_disconnect => {
                    awaiting_connect = false;
                    mux.handle_event(EngineEvent::Connected);
                }
                5 if awaiting_disconnect => {
                    awaiting_disconnect = false;
                    awaiting_connect = false;
                    session_open = false;
                    mux.handle_event(EngineEvent::Disconnect);
                }
                _ => {}
            }

            for call in &mux.engine().calls[seen_calls..] {
                match call {
                    Call::Connect => {
                        assert!(!session_open, "connect while a session is open");
                        session_open = true;
                        awaiting_connect = true;
                    }
                    Call::Disconnect => {
                        assert!(session_open, "disconnect without a session");
                        assert!(!awaiting_disconnect, "disconnect while disconnecting");
                        awaiting_disconnect = true;
                    }
                    Call::Send(_) => {}
                }
            }
            seen_calls = mux.engine().calls.len();
            assert_eq!(mux.stats().consumers, model.len());
        }

        // Drain: everyone leaves and the engine settles
        for id in ids {
            let f = fired.clone();
            mux.deregister(
                &ConsumerId::new(id),
                Completion::new(move || {
                    f.fetch_add(1, Ordering::SeqCst);
                }),
            );
            issued += 1;
        }
        if awaiting_connect && !awaiting_disconnect {
            mux.handle_event(EngineEvent::Connected);
        }
        if mux.state() == ConnectionState::Disconnecting {
            mux.handle_event(EngineEvent::Disconnect);
        }

        assert_eq!(mux.state(), ConnectionState::Idle);
        assert_eq!(mux.stats().pending_completions, 0);
        assert_eq!(fired.load(Ordering::SeqCst), issued);
    }

    #[test]
    fn test_connect_disconnect_balance_under_churn() {
        let mut mux = mux();
        for round in 0..5 {
            let id = format!("c{}", round);
            mux.register(Probe::new(&id));
            if round % 2 == 0 {
                mux.handle_event(EngineEvent::Connected);
            }
            mux.deregister(&ConsumerId::new(id.as_str()), Completion::noop());
            if round % 2 == 1 {
                mux.handle_event(EngineEvent::Connected);
            }
            mux.handle_event(EngineEvent::Disconnect);
            assert_eq!(mux.state(), ConnectionState::Idle);
            assert_eq!(mux.stats().pending_completions, 0);
        }
        assert_eq!(mux.engine().count(&Call::Connect), 5);
        assert_eq!(mux.engine().count(&Call::Disconnect), 5);
    }
}
