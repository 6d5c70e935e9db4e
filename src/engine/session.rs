// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::devices::DeviceTracker;
use crate::error::{BridgeError, Result, TpiErrorCode};
use crate::event::{EngineEvent, LogLevel};
use crate::protocol::{split_lines, Command, TpiMessage};

/// Events tagged with the session generation that produced them.
pub(crate) type TaggedEvent = (u64, EngineEvent);

/// Emits events on behalf of one session.
#[derive(Clone)]
pub(crate) struct SessionEmitter {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
    ended: Arc<AtomicBool>,
}

impl SessionEmitter {
    pub(crate) fn new(
        generation: u64,
        tx: mpsc::UnboundedSender<TaggedEvent>,
        ended: Arc<AtomicBool>,
    ) -> Self {
        Self {
            generation,
            tx,
            ended,
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send((self.generation, event));
    }

    fn log(&self, level: LogLevel, text: impl Into<String>) {
        self.emit(EngineEvent::Log(level, text.into()));
    }

    /// Mark the session ended and emit its one `Disconnect`.
    ///
    /// `ended` must be visible before the event is queued so that a
    /// concurrent `disconnect()` either sees it or has its shutdown observed.
    fn finish(self) {
        self.ended.store(true, Ordering::Release);
        self.emit(EngineEvent::Disconnect);
    }
}

/// Run one engine session: connect, log in, relay events, and reconnect
/// with backoff until shut down or out of attempts.
pub(crate) async fn run_session(
    config: ControllerConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut shutdown: watch::Receiver<bool>,
    emitter: SessionEmitter,
) {
    let mut tracker = DeviceTracker::new();
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            if attempt > config.max_reconnect_attempts {
                emitter.log(
                    LogLevel::Warn,
                    format!("Giving up on {} after {} attempts", config.address(), attempt),
                );
                break;
            }
            let delay = config.reconnect_delay(attempt);
            emitter.log(
                LogLevel::Warn,
                format!(
                    "Reconnecting to {} in {:.1}s (attempt {})",
                    config.address(),
                    delay.as_secs_f64(),
                    attempt
                ),
            );
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        // Commands issued while there was no live connection are stale
        while let Ok(cmd) = commands.try_recv() {
            warn!("Dropping command {} queued while disconnected", cmd.code());
        }

        let mut logged_in = false;
        let res = tokio::select! {
            res = run_connection(&config, &mut commands, &emitter, &mut tracker, &mut logged_in) => res,
            _ = shutdown.changed() => {
                debug!("Session shutting down");
                break;
            }
        };

        let Err(e) = res;
        emitter.emit(EngineEvent::Error(e.to_string()));
        if !e.is_retryable() {
            break;
        }
        attempt = if logged_in { 1 } else { attempt + 1 };
    }

    info!("Disconnected from {}", config.address());
    emitter.finish();
}

/// A single TCP connection. Returns only on error; shutdown is handled by
/// the caller dropping this future.
async fn run_connection(
    config: &ControllerConfig,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    emitter: &SessionEmitter,
    tracker: &mut DeviceTracker,
    logged_in: &mut bool,
) -> Result<Infallible> {
    info!("Connecting to Envisalink at {}", config.address());

    let stream = timeout(config.connect_timeout(), TcpStream::connect(config.address()))
        .await
        .map_err(|_| BridgeError::ConnectionTimeout)??;
    debug!("TCP socket connected");

    let (mut reader, mut writer) = stream.into_split();
    tracker.reset();

    let login_deadline = sleep(config.connect_timeout());
    tokio::pin!(login_deadline);

    let mut keepalive = interval(config.keepalive_interval());
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.tick().await;

    let mut buf = vec![0u8; 4096];
    let mut leftover = Vec::new();

    loop {
        tokio::select! {
            res = reader.read(&mut buf) => {
                let n = res?;
                if n == 0 {
                    debug!("Reader: connection closed");
                    return Err(BridgeError::Disconnected);
                }
                let mut data = std::mem::take(&mut leftover);
                data.extend_from_slice(&buf[..n]);

                for line in split_lines(&data, &mut leftover) {
                    if let Some(reply) = handle_line(&line, &config.password, emitter, tracker, logged_in)? {
                        write_command(&mut writer, &reply).await?;
                    }
                }
            }
            Some(cmd) = commands.recv(), if *logged_in => {
                write_command(&mut writer, &cmd).await?;
            }
            _ = keepalive.tick(), if *logged_in => {
                write_command(&mut writer, &Command::Poll).await?;
            }
            _ = &mut login_deadline, if !*logged_in => {
                return Err(BridgeError::LoginTimeout);
            }
        }
    }
}

async fn write_command(writer: &mut OwnedWriteHalf, cmd: &Command) -> Result<()> {
    if cmd.is_sensitive() {
        debug!("Sending command {} (data masked)", cmd.code());
    } else {
        debug!("Sending command {}{}", cmd.code(), cmd.data());
    }
    writer.write_all(cmd.to_wire_string().as_bytes()).await?;
    Ok(())
}

/// Process one received line. Returns a command to send in reply, if any.
fn handle_line(
    line: &str,
    password: &str,
    emitter: &SessionEmitter,
    tracker: &mut DeviceTracker,
    logged_in: &mut bool,
) -> Result<Option<Command>> {
    let msg = match TpiMessage::parse(line) {
        Ok(msg) => msg,
        Err(e) => {
            emitter.log(LogLevel::Warn, format!("Discarding frame: {}", e));
            return Ok(None);
        }
    };

    match msg.code {
        505 => match msg.data.as_str() {
            "3" => {
                debug!("Password requested");
                Ok(Some(Command::NetworkLogin {
                    password: password.to_string(),
                }))
            }
            "1" => {
                *logged_in = true;
                emitter.log(LogLevel::Debug, "Login successful");
                emitter.emit(EngineEvent::Connected);
                Ok(Some(Command::StatusReport))
            }
            "0" => {
                emitter.log(LogLevel::Error, "Login failed: password rejected");
                Err(BridgeError::LoginFailed)
            }
            "2" => Err(BridgeError::LoginTimeout),
            other => {
                emitter.log(LogLevel::Warn, format!("Unexpected login response: {}", other));
                Ok(None)
            }
        },
        500 => {
            emitter.log(LogLevel::Debug, format!("Command acknowledged: {}", msg.data));
            Ok(None)
        }
        501 => {
            emitter.log(LogLevel::Warn, "Command error: bad checksum");
            Ok(None)
        }
        502 => {
            let text = match TpiErrorCode::from_code(&msg.data) {
                Some(code) => format!("System error {}", code),
                None => format!("System error {}", msg.data),
            };
            emitter.log(LogLevel::Error, text);
            Ok(None)
        }
        _ => {
            match tracker.apply(&msg) {
                Some(update) => emitter.emit(EngineEvent::Update(update)),
                None => debug!("Unhandled TPI message {} ({})", msg.code, msg.data),
            }
            Ok(None)
        }
    }
}
