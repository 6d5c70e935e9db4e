// MIT License - Copyright (c) 2026 envisalink-bridge contributors

pub mod envisalink;
mod session;

use std::future::Future;

use crate::event::EngineEvent;
use crate::protocol::Command;

pub use envisalink::EnvisalinkEngine;

/// The component that owns the physical connection to the device.
///
/// All methods are fire-and-forget: completion is observed later through
/// [`next_event`](ConnectionEngine::next_event), never by blocking the caller.
///
/// Contract:
/// - after `connect()` the engine eventually emits `Connected` or `Error`;
/// - every started session ends with exactly one `Disconnect`;
/// - once `disconnect()` has returned `true`, no further events of that
///   session are delivered.
pub trait ConnectionEngine: Send + 'static {
    /// Start a session.
    fn connect(&mut self);

    /// End the current session. Returns `true` if there was nothing to tear
    /// down (no `Disconnect` event will follow), `false` if a `Disconnect`
    /// event will report completion.
    fn disconnect(&mut self) -> bool;

    /// Send a command to the device.
    fn send_command(&mut self, command: Command);

    /// Wait for the next event. Returns `None` once the engine can no longer
    /// produce events.
    fn next_event(&mut self) -> impl Future<Output = Option<EngineEvent>> + Send;
}
