//! Example: Register one consumer and print live zone events.

use envisalink_bridge::{AdapterOutput, Consumer, Controller, ControllerConfig, InputAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ControllerConfig::builder()
        .host("192.168.0.50")
        .password("user")
        .build();

    let (mux, _task) = Controller::for_config(config);
    let (zones, mut rx) = InputAdapter::new("zone-printer");
    mux.register(zones.clone())?;

    println!("Listening for zone events (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            output = rx.recv() => {
                match output {
                    Some(AdapterOutput::Message(msg)) if msg.topic == "zone event" => {
                        println!(
                            "Zone {} {} (open={}, alarm={})",
                            msg.payload["zone"],
                            msg.payload["event"],
                            msg.payload["status"]["open"],
                            msg.payload["status"]["alarm"],
                        );
                    }
                    Some(AdapterOutput::Message(_)) => {}
                    Some(AdapterOutput::Status(status)) => {
                        println!("[{}]", status.label());
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    mux.deregister(zones.id().clone()).await?;
    Ok(())
}
