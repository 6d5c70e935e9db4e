// MIT License - Copyright (c) 2026 envisalink-bridge contributors
//
//! # envisalink-bridge
//!
//! Shares one Envisalink TPI connection among any number of consumers.
//!
//! The connection is opened when the first consumer registers and closed
//! when the last one leaves. Zone, partition and system updates from the
//! panel are fanned out to every registered consumer, along with connection
//! status changes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use envisalink_bridge::{AdapterOutput, ControllerConfig, Controller, InputAdapter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ControllerConfig::builder()
//!         .host("192.168.0.50")
//!         .password("user")
//!         .build();
//!
//!     let (mux, _task) = Controller::for_config(config);
//!
//!     let (input, mut rx) = InputAdapter::new("zones");
//!     mux.register(input)?;
//!
//!     tokio::spawn(async move {
//!         while let Some(output) = rx.recv().await {
//!             if let AdapterOutput::Message(msg) = output {
//!                 println!("{}: {}", msg.topic, msg.payload);
//!             }
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     mux.close().await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod devices;
pub mod engine;
pub mod error;
pub mod event;
pub mod mux;
pub mod protocol;

// Re-exports for convenience
pub use adapter::{AdapterOutput, DownstreamMessage, InputAdapter, OutputAdapter};
pub use config::{ControllerConfig, ControllerConfigBuilder};
pub use engine::{ConnectionEngine, EnvisalinkEngine};
pub use error::{BridgeError, Result, TpiErrorCode};
pub use event::{ConsumerStatus, DeviceUpdate, EngineEvent, LogLevel, UpdateKind};
pub use mux::{Completion, ConnectionState, Consumer, ConsumerId, Controller, MuxHandle, MuxStats};
pub use protocol::{Command, PanicType};
