//! Example: Two consumers share one Envisalink connection.
//!
//! The connection opens when the first consumer registers and stays up until
//! the last one leaves.

use std::time::Duration;

use envisalink_bridge::{
    AdapterOutput, Command, Consumer, Controller, ControllerConfig, DownstreamMessage,
    InputAdapter, OutputAdapter,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ControllerConfig::builder()
        .host("192.168.0.50")
        .password("user")
        .build();

    let (mux, _task) = Controller::for_config(config);

    let (events, mut events_rx) = InputAdapter::new("events");
    let (commands, mut commands_rx) = OutputAdapter::new("commands", mux.clone());
    mux.register(events.clone())?;
    mux.register(commands.clone())?;

    tokio::spawn(async move {
        while let Some(output) = events_rx.recv().await {
            match output {
                AdapterOutput::Status(status) => println!("events: {}", status.label()),
                AdapterOutput::Message(msg) => println!("events: {} {}", msg.topic, msg.payload),
            }
        }
    });
    tokio::spawn(async move {
        while let Some(output) = commands_rx.recv().await {
            if let AdapterOutput::Status(status) = output {
                println!("commands: {}", status.label());
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("{:?}", mux.stats().await?);

    // Ask the panel to replay zone and partition state
    commands.handle_input(DownstreamMessage {
        topic: "command".to_string(),
        payload: json!({ "op": "status_report" }),
    })?;
    mux.send_command(Command::Poll)?;

    tokio::time::sleep(Duration::from_secs(5)).await;

    // The first consumer leaving keeps the connection up for the other
    mux.deregister(commands.id().clone()).await?;
    println!("{:?}", mux.stats().await?);

    // The last one leaving closes it
    mux.deregister(events.id().clone()).await?;
    println!("{:?}", mux.stats().await?);

    mux.close().await?;
    Ok(())
}
