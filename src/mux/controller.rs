// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::engine::{ConnectionEngine, EnvisalinkEngine};
use crate::error::{BridgeError, Result};
use crate::mux::consumer::{Consumer, ConsumerId};
use crate::mux::multiplexer::{Multiplexer, MuxStats};
use crate::mux::shutdown::Completion;
use crate::protocol::Command;

enum Request {
    Register(Arc<dyn Consumer>),
    Deregister { id: ConsumerId, done: Completion },
    SendCommand(Command),
    Close { done: Completion },
    Stats { reply: oneshot::Sender<MuxStats> },
}

/// Owns a [`Multiplexer`] on its own task.
///
/// Requests from [`MuxHandle`]s and engine events are handled one at a
/// time, so the registry and connection state never need a lock.
pub struct Controller<E: ConnectionEngine> {
    mux: Multiplexer<E>,
    requests: mpsc::UnboundedReceiver<Request>,
}

impl Controller<EnvisalinkEngine> {
    /// Spawn a controller for the Envisalink at `config.address()`.
    pub fn for_config(config: ControllerConfig) -> (MuxHandle, JoinHandle<()>) {
        let label = config.address();
        Controller::spawn(EnvisalinkEngine::new(config), label)
    }
}

impl<E: ConnectionEngine> Controller<E> {
    /// Start the controller task. Once every handle has been dropped the
    /// connection is closed, and the task ends when that teardown is done.
    pub fn spawn(engine: E, label: impl Into<String>) -> (MuxHandle, JoinHandle<()>) {
        let (tx, requests) = mpsc::unbounded_channel();
        let controller = Self {
            mux: Multiplexer::new(engine, label),
            requests,
        };
        let handle = tokio::spawn(controller.run());
        (MuxHandle { tx }, handle)
    }

    async fn run(mut self) {
        let mut events_open = true;
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                event = self.mux.engine_mut().next_event(), if events_open => match event {
                    Some(event) => self.mux.handle_event(event),
                    None => {
                        warn!("Engine event stream ended");
                        events_open = false;
                    }
                },
            }
        }

        if !self.mux.state().is_terminal() {
            info!("All handles dropped; closing connection");
            self.mux.close(Completion::noop());
        }

        // Teardown still runs off engine events
        while events_open && !self.mux.state().is_terminal() {
            match self.mux.engine_mut().next_event().await {
                Some(event) => self.mux.handle_event(event),
                None => events_open = false,
            }
        }
        self.mux.release_pending();
        debug!("Controller stopped");
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Register(consumer) => self.mux.register(consumer),
            Request::Deregister { id, done } => self.mux.deregister(&id, done),
            Request::SendCommand(command) => self.mux.send_command(command),
            Request::Close { done } => self.mux.close(done),
            Request::Stats { reply } => {
                let _ = reply.send(self.mux.stats());
            }
        }
    }
}

/// Cheap, cloneable access to a running [`Controller`].
#[derive(Clone)]
pub struct MuxHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl MuxHandle {
    fn request(&self, request: Request) -> Result<()> {
        self.tx.send(request).map_err(|_| BridgeError::ControllerGone)
    }

    /// Add a consumer. The first consumer opens the connection.
    pub fn register(&self, consumer: Arc<dyn Consumer>) -> Result<()> {
        self.request(Request::Register(consumer))
    }

    /// Remove a consumer, firing `done` once its share of the connection
    /// has been released.
    pub fn deregister_with(&self, id: ConsumerId, done: Completion) -> Result<()> {
        self.request(Request::Deregister { id, done })
    }

    /// Remove a consumer and wait until its share of the connection has
    /// been released.
    pub async fn deregister(&self, id: ConsumerId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.deregister_with(id, Completion::from_sender(tx))?;
        rx.await.map_err(|_| BridgeError::ControllerGone)
    }

    pub fn send_command(&self, command: Command) -> Result<()> {
        self.request(Request::SendCommand(command))
    }

    /// Fire `done` once the connection has been closed for good.
    pub fn close_with(&self, done: Completion) -> Result<()> {
        self.request(Request::Close { done })
    }

    /// Close the connection for good and wait for the teardown.
    pub async fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.close_with(Completion::from_sender(tx))?;
        rx.await.map_err(|_| BridgeError::ControllerGone)
    }

    pub async fn stats(&self) -> Result<MuxStats> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Stats { reply })?;
        rx.await.map_err(|_| BridgeError::ControllerGone)
    }
}
