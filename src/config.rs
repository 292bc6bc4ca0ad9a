//! Client configuration

use std::time::Duration;

use crate::peer::ReconnectPolicy;
use crate::{Error, Result};

/// Main configuration for [`WebRtcClient`](crate::WebRtcClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub websocket_url: String,

    /// Automatically reconnect dropped transports and peer connections
    /// (default: true)
    pub auto_reconnect: bool,

    /// Keep-alive ping interval on the signaling transport (default: 3s)
    pub ping_interval: Duration,

    /// Window for a session to reach the connected state before failing
    /// with a join timeout (default: 15s)
    pub join_timeout: Duration,

    /// Grace period after an ICE `disconnected` notification before the
    /// session reconnects; transient drops self-heal within it (default: 3s)
    pub disconnected_grace: Duration,

    /// Transport protocols accepted for locally generated ICE candidates;
    /// candidates outside this list are not forwarded (default: udp, tcp)
    pub candidate_types: Vec<String>,

    /// Escape angle brackets in inbound data-channel text messages
    /// (default: true)
    pub sanitize_data_channel_strings: bool,

    /// Default statistics polling interval (default: 5s)
    pub stats_interval: Duration,

    /// Per-session reconnect policy after ICE failure
    pub session_reconnect: ReconnectPolicy,

    /// Signaling transport reconnect policy (delay doubles per failure,
    /// no jitter)
    pub transport_reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            websocket_url: "ws://localhost:5080/WebRTCAppEE/websocket".to_string(),
            auto_reconnect: true,
            ping_interval: Duration::from_secs(3),
            join_timeout: Duration::from_secs(15),
            disconnected_grace: Duration::from_secs(3),
            candidate_types: vec!["udp".to_string(), "tcp".to_string()],
            sanitize_data_channel_strings: true,
            stats_interval: Duration::from_secs(5),
            session_reconnect: ReconnectPolicy::default(),
            transport_reconnect: ReconnectPolicy {
                max_attempts: u32::MAX,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                jitter_enabled: false,
            },
        }
    }
}

impl ClientConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `websocket_url` is not a ws:// or wss:// URL
    /// - `ping_interval`, `join_timeout` or `stats_interval` is zero
    /// - `candidate_types` is empty
    /// - a reconnect policy has `max_delay` below `base_delay`
    pub fn validate(&self) -> Result<()> {
        if !self.websocket_url.starts_with("ws://") && !self.websocket_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "websocket_url must start with ws:// or wss://, got {}",
                self.websocket_url
            )));
        }

        if self.ping_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "ping_interval must be non-zero".to_string(),
            ));
        }

        if self.join_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "join_timeout must be non-zero".to_string(),
            ));
        }

        if self.stats_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "stats_interval must be non-zero".to_string(),
            ));
        }

        if self.candidate_types.is_empty() {
            return Err(Error::InvalidConfig(
                "candidate_types must list at least one transport protocol".to_string(),
            ));
        }

        for policy in [&self.session_reconnect, &self.transport_reconnect] {
            if policy.max_delay < policy.base_delay {
                return Err(Error::InvalidConfig(format!(
                    "reconnect max_delay {:?} is below base_delay {:?}",
                    policy.max_delay, policy.base_delay
                )));
            }
        }

        Ok(())
    }
}
