// MIT License - Copyright (c) 2026 envisalink-bridge contributors
// MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use envisalink_bridge::{
    AdapterOutput, Consumer, ConsumerStatus, Controller, ControllerConfig, DownstreamMessage,
    InputAdapter, MuxHandle, OutputAdapter,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "envisalink2mqtt")]
#[command(about = "Bridge between an Envisalink alarm interface and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    controller: ControllerToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct ControllerToml {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_password")]
    password: String,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_keepalive_interval")]
    keepalive_interval_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    max_reconnect_attempts: u32,
}

fn default_port() -> u16 {
    4025
}
fn default_password() -> String {
    "user".to_string()
}
fn default_connect_timeout() -> u64 {
    10000
}
fn default_keepalive_interval() -> u64 {
    60000
}
fn default_reconnect_delay() -> u64 {
    5000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_event_topic")]
    event_topic: String,
    #[serde(default = "default_command_topic")]
    command_topic: String,
    #[serde(default = "default_status_topic")]
    status_topic: String,
}

fn default_client_id() -> String {
    "envisalink-bridge".to_string()
}
fn default_event_topic() -> String {
    "envisalink/events".to_string()
}
fn default_command_topic() -> String {
    "envisalink/cmd".to_string()
}
fn default_status_topic() -> String {
    "envisalink/status".to_string()
}

fn build_controller_config(toml: &ControllerToml) -> ControllerConfig {
    ControllerConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .password(&toml.password)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .keepalive_interval_ms(toml.keepalive_interval_ms)
        .reconnect_delay_ms(toml.reconnect_delay_ms)
        .max_reconnect_attempts(toml.max_reconnect_attempts)
        .build()
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Device update: {now, topic, payload}
#[derive(Serialize)]
struct MqttEvent {
    now: u64,
    topic: String,
    payload: Value,
}

// Adapter status: {now, node, fill, shape, text}
#[derive(Serialize)]
struct MqttStatus {
    now: u64,
    node: String,
    fill: &'static str,
    shape: &'static str,
    text: &'static str,
}

// Command acknowledgement: {now, op: "CMD_ACK", success, src}
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_status(client: &AsyncClient, topic: &str, node: &str, status: ConsumerStatus) {
    let msg = MqttStatus {
        now: now_epoch_ms(),
        node: node.to_string(),
        fill: status.fill(),
        shape: status.shape(),
        text: status.label(),
    };
    publish_json(client, topic, &msg, true).await;
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    success: bool,
    src: Option<Value>,
    error: Option<String>,
) {
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        src,
        error,
    };
    publish_json(client, topic, &msg, false).await;
}

/// An inbound payload is a JSON object or string, otherwise a raw command.
/// Raw commands such as `2001234` also parse as JSON numbers, so anything
/// else is taken as text.
fn decode_command_payload(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ (Value::Object(_) | Value::String(_))) => value,
        _ => Value::String(String::from_utf8_lossy(bytes).trim().to_string()),
    }
}

// ---------------------------------------------------------------------------
// Adapter output → MQTT
// ---------------------------------------------------------------------------

struct Topics {
    event: String,
    command: String,
    status: String,
}

async fn forward_input(
    node: String,
    mut rx: envisalink_bridge::adapter::AdapterReceiver,
    client: AsyncClient,
    topics: Arc<Topics>,
) {
    while let Some(output) = rx.recv().await {
        match output {
            AdapterOutput::Status(status) => {
                info!("{node}: {}", status.label());
                publish_status(&client, &topics.status, &node, status).await;
            }
            AdapterOutput::Message(DownstreamMessage { topic, payload }) => {
                debug!("{node}: {topic}");
                let msg = MqttEvent {
                    now: now_epoch_ms(),
                    topic,
                    payload,
                };
                publish_json(&client, &topics.event, &msg, false).await;
            }
        }
    }
}

async fn forward_output(
    node: String,
    mut rx: envisalink_bridge::adapter::AdapterReceiver,
    client: AsyncClient,
    topics: Arc<Topics>,
) {
    while let Some(output) = rx.recv().await {
        match output {
            AdapterOutput::Status(status) => {
                publish_status(&client, &topics.status, &node, status).await;
            }
            AdapterOutput::Message(msg) => {
                publish_cmd_ack(&client, &topics.event, true, Some(msg.payload), None).await;
            }
        }
    }
}

async fn shutdown_adapters(mux: &MuxHandle, adapters: &[Arc<dyn Consumer>]) {
    for adapter in adapters {
        if let Err(e) = mux.deregister(adapter.id().clone()).await {
            warn!("Failed to deregister {}: {e}", adapter.id());
        }
    }
    if let Err(e) = mux.close().await {
        warn!("Failed to close controller: {e}");
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=envisalink_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    let (mut mqtt_host, mut mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let controller_config = build_controller_config(&config.controller);
        info!("Sharing Envisalink connection to {}", controller_config.address());
        let (mux, controller_task) = Controller::for_config(controller_config);

        let topics = Arc::new(Topics {
            event: config.mqtt.event_topic.clone(),
            command: config.mqtt.command_topic.clone(),
            status: config.mqtt.status_topic.clone(),
        });

        // Set up MQTT
        let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        // Both adapters share the one controller connection
        let (input, input_rx) = InputAdapter::new("mqtt-in");
        let (output, output_rx) = OutputAdapter::new("mqtt-out", mux.clone());
        let input_handle = tokio::spawn(forward_input(
            input.id().to_string(),
            input_rx,
            client.clone(),
            Arc::clone(&topics),
        ));
        let output_handle = tokio::spawn(forward_output(
            output.id().to_string(),
            output_rx,
            client.clone(),
            Arc::clone(&topics),
        ));
        mux.register(input.clone())?;
        mux.register(output.clone())?;

        // MQTT event loop (receives commands)
        let client_cmds = client.clone();
        let topics_cmds = Arc::clone(&topics);
        let output_cmds = Arc::clone(&output);
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe after a broker reconnect
                        info!("MQTT: connected, subscribing to {}", topics_cmds.command);
                        if let Err(e) = client_cmds
                            .subscribe(&topics_cmds.command, QoS::AtLeastOnce)
                            .await
                        {
                            error!("Failed to subscribe to {}: {e}", topics_cmds.command);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic != topics_cmds.command {
                            continue;
                        }
                        let payload = decode_command_payload(&msg.payload);
                        info!("MQTT command received: {payload}");
                        let message = DownstreamMessage {
                            topic: msg.topic.clone(),
                            payload: payload.clone(),
                        };
                        if let Err(e) = output_cmds.handle_input(message) {
                            warn!("Rejected MQTT command: {e}");
                            publish_cmd_ack(
                                &client_cmds,
                                &topics_cmds.event,
                                false,
                                Some(payload),
                                Some(e.to_string()),
                            )
                            .await;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        // Adapters leave first, then the shared connection is closed for good
        mqtt_handle.abort();
        let adapters: [Arc<dyn Consumer>; 2] = [input, output];
        shutdown_adapters(&mux, &adapters).await;
        input_handle.abort();
        output_handle.abort();

        drop(adapters);
        drop(mux);
        if timeout(Duration::from_secs(5), controller_task).await.is_err() {
            warn!("Controller task did not stop in time");
        }

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok(new_config) => match parse_mqtt_url(&new_config.mqtt.url) {
                Ok((new_host, new_port)) => {
                    mqtt_host = new_host;
                    mqtt_port = new_port;
                    config = new_config;
                    info!("Config reloaded successfully");
                }
                Err(e) => warn!("Invalid MQTT URL in new config, keeping previous: {e}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
