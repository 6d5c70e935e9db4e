// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::ControllerConfig;
use crate::engine::ConnectionEngine;
use crate::engine::session::{run_session, SessionEmitter, TaggedEvent};
use crate::event::EngineEvent;
use crate::protocol::Command;

struct Session {
    command_tx: mpsc::UnboundedSender<Command>,
    shutdown_tx: watch::Sender<bool>,
    ended: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// TCP engine for the Envisalink TPI.
///
/// Each `connect()` spawns a session task that owns the socket, logs in,
/// keeps the link alive and reconnects with backoff. Events are tagged with
/// the generation of the session that produced them so that events from an
/// abandoned session are never delivered.
///
/// Must be used from within a tokio runtime.
pub struct EnvisalinkEngine {
    config: ControllerConfig,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    generation: u64,
    session: Option<Session>,
}

impl EnvisalinkEngine {
    pub fn new(config: ControllerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            events_tx,
            events_rx,
            generation: 0,
            session: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn session_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.ended.load(Ordering::Acquire))
    }
}

impl ConnectionEngine for EnvisalinkEngine {
    fn connect(&mut self) {
        if self.session_active() {
            warn!("connect() called while a session is already active");
            return;
        }

        self.generation += 1;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ended = Arc::new(AtomicBool::new(false));
        let emitter = SessionEmitter::new(self.generation, self.events_tx.clone(), ended.clone());

        debug!("Starting session {}", self.generation);
        let handle = tokio::spawn(run_session(
            self.config.clone(),
            command_rx,
            shutdown_rx,
            emitter,
        ));

        self.session = Some(Session {
            command_tx,
            shutdown_tx,
            ended,
            handle,
        });
    }

    fn disconnect(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return true;
        };

        if session.ended.load(Ordering::Acquire) {
            // Its Disconnect may still be queued; abandon it
            self.generation += 1;
            return true;
        }

        debug!("Stopping session {}", self.generation);
        let _ = session.shutdown_tx.send(true);
        false
    }

    fn send_command(&mut self, command: Command) {
        match &self.session {
            Some(session) if !session.ended.load(Ordering::Acquire) => {
                if session.command_tx.send(command).is_err() {
                    warn!("Session task has exited; command dropped");
                }
            }
            _ => warn!("No active session; dropping command {}", command.code()),
        }
    }

    fn next_event(&mut self) -> impl Future<Output = Option<EngineEvent>> + Send {
        async move {
            loop {
                let (generation, event) = self.events_rx.recv().await?;
                if generation == self.generation {
                    return Some(event);
                }
                trace!("Dropping event from stale session {}: {:?}", generation, event);
            }
        }
    }
}

impl Drop for EnvisalinkEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.handle.abort();
        }
    }
}
