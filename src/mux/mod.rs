// MIT License - Copyright (c) 2026 envisalink-bridge contributors

//! Connection sharing: one engine connection, many consumers.

mod consumer;
mod controller;
mod multiplexer;
mod registry;
mod shutdown;
mod state;

pub use consumer::{Consumer, ConsumerId};
pub use controller::{Controller, MuxHandle};
pub use multiplexer::{Multiplexer, MuxStats};
pub use shutdown::{Completion, ShutdownCoordinator};
pub use state::ConnectionState;
