// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::time::Duration;

/// Configuration for the connection to an Envisalink module.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Envisalink host name or IP address
    pub host: String,
    /// TPI port (default: 4025)
    pub port: u16,
    /// TPI password (the Envisalink web UI password, default: "user")
    pub password: String,
    /// TCP connect and login timeout in milliseconds (default: 10000)
    pub connect_timeout_ms: u64,
    /// Interval between keepalive polls in milliseconds (default: 60000)
    pub keepalive_interval_ms: u64,
    /// Base delay for exponential reconnect backoff in milliseconds (default: 5000)
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts after a dropped session before giving up (0 = never retry)
    pub max_reconnect_attempts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.100".to_string(),
            port: 4025,
            password: "user".to_string(),
            connect_timeout_ms: 10000,
            keepalive_interval_ms: 60000,
            reconnect_delay_ms: 5000,
            max_reconnect_attempts: 5,
        }
    }
}

impl ControllerConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// `host:port` as accepted by `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Backoff before reconnect attempt `attempt` (1-based), doubling up to 16x the base delay.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(4);
        Duration::from_millis(self.reconnect_delay_ms.saturating_mul(factor))
    }
}

/// Builder for ControllerConfig.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn keepalive_interval_ms(mut self, ms: u64) -> Self {
        self.config.keepalive_interval_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn build(self) -> ControllerConfig {
        self.config
    }
}
