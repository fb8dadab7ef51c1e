//! Session configuration.
//!
//! Durations are (de)serialized as integer milliseconds so a config file
//! reads `"restart_interval": 5000` rather than a nested struct.

use std::time::Duration;

use clublink_protocol::{HouseId, LoginMode, UserId};
use clublink_transport::SocketConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Everything a [`Session`](crate::Session) needs except the injected
/// dialer, cipher, and event handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // -- Endpoints --
    /// Authentication endpoint, `host:port`.
    pub auth_addr: String,
    /// Lobby host. The port is handed out by the auth endpoint.
    pub lobby_host: String,
    /// TCP keep-alive idle time. Zero disables keep-alive.
    #[serde(with = "millis")]
    pub keep_alive: Duration,
    /// Restart after a dropped connection or a kick.
    pub auto_reconnect: bool,

    // -- Identity --
    pub account: String,
    pub password_hash: String,
    /// Known user ID. Replaced by the one the auth endpoint reports.
    pub user_id: UserId,
    pub house_id: HouseId,
    pub login_mode: LoginMode,
    /// Only used with [`LoginMode::Mobile`].
    pub mobile: String,
    pub machine_id: String,
    pub plaza_version: u32,

    // -- Handshake --
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Bound on each handshake wait (lobby port handoff, lobby logon).
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,
    /// Settle delay before entering the house.
    #[serde(with = "millis")]
    pub enter_house_delay: Duration,
    /// Settle delay between entering the house and reporting login.
    #[serde(with = "millis")]
    pub login_done_delay: Duration,

    // -- Reconnect --
    /// Pause between tearing down and the first reconnect attempt.
    #[serde(with = "millis")]
    pub restart_delay: Duration,
    #[serde(with = "millis")]
    pub restart_interval: Duration,
    pub max_restart_attempts: u32,
    /// Kicks further apart than this reset the kick counter.
    #[serde(with = "millis")]
    pub kick_window: Duration,
    /// Kicks allowed inside the window; one more disables reconnects.
    pub kick_threshold: u32,
    /// The n-th kick waits `kick_backoff * n` before reconnecting.
    #[serde(with = "millis")]
    pub kick_backoff: Duration,

    // -- Command pipeline --
    /// How long the sender waits for an acknowledgment before moving on.
    #[serde(with = "millis")]
    pub ack_timeout: Duration,
    #[serde(with = "millis")]
    pub write_timeout: Duration,
    #[serde(with = "millis")]
    pub send_poll_interval: Duration,

    // -- Snapshot TTLs --
    #[serde(with = "millis")]
    pub table_ttl: Duration,
    #[serde(with = "millis")]
    pub member_ttl: Duration,
    #[serde(with = "millis")]
    pub house_ttl: Duration,
    #[serde(with = "millis")]
    pub application_ttl: Duration,
    #[serde(with = "millis")]
    pub forbidden_ttl: Duration,
}

const TEN_MINUTES: Duration = Duration::from_secs(10 * 60);
const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_addr: "127.0.0.1:8600".into(),
            lobby_host: "127.0.0.1".into(),
            keep_alive: Duration::from_secs(30),
            auto_reconnect: true,
            account: String::new(),
            password_hash: String::new(),
            user_id: UserId::default(),
            house_id: HouseId::default(),
            login_mode: LoginMode::Account,
            mobile: String::new(),
            machine_id: String::new(),
            plaza_version: 0x0601_0000,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(8),
            enter_house_delay: Duration::from_millis(500),
            login_done_delay: Duration::from_millis(1500),
            restart_delay: Duration::from_secs(1),
            restart_interval: Duration::from_secs(5),
            max_restart_attempts: 30,
            kick_window: Duration::from_secs(2 * 60),
            kick_threshold: 5,
            kick_backoff: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            send_poll_interval: Duration::from_millis(5),
            table_ttl: TEN_MINUTES,
            member_ttl: TEN_MINUTES,
            house_ttl: TEN_MINUTES,
            application_ttl: ONE_DAY,
            forbidden_ttl: ONE_DAY,
        }
    }
}

impl SessionConfig {
    /// Longest accepted send poll interval.
    pub const MAX_SEND_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Replaces values that would stall or spin the session with their
    /// defaults, logging a warning for each.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        macro_rules! nonzero {
            ($($field:ident),+ $(,)?) => {$(
                if self.$field.is_zero() {
                    warn!(
                        field = stringify!($field),
                        default_ms = defaults.$field.as_millis() as u64,
                        "zero duration, using default"
                    );
                    self.$field = defaults.$field;
                }
            )+};
        }
        nonzero!(
            connect_timeout,
            handshake_timeout,
            restart_interval,
            kick_window,
            ack_timeout,
            write_timeout,
            send_poll_interval,
            table_ttl,
            member_ttl,
            house_ttl,
            application_ttl,
            forbidden_ttl,
        );

        if self.send_poll_interval > Self::MAX_SEND_POLL_INTERVAL {
            warn!(
                interval_ms = self.send_poll_interval.as_millis() as u64,
                "send_poll_interval exceeds maximum, clamping"
            );
            self.send_poll_interval = Self::MAX_SEND_POLL_INTERVAL;
        }
        if self.max_restart_attempts == 0 {
            warn!("max_restart_attempts is 0, using 1");
            self.max_restart_attempts = 1;
        }
        if self.kick_threshold == 0 {
            warn!("kick_threshold is 0, using 1");
            self.kick_threshold = 1;
        }
        self
    }

    /// Socket options for both endpoints.
    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            tcp_nodelay: true,
            keep_alive: (!self.keep_alive.is_zero()).then_some(self.keep_alive),
            connect_timeout: self.connect_timeout,
        }
    }

    /// Lobby address for a handed-off port.
    pub fn lobby_addr(&self, port: u16) -> String {
        format!("{}:{}", self.lobby_host, port)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_limits() {
        let c = SessionConfig::default();
        assert_eq!(c.handshake_timeout, Duration::from_secs(8));
        assert_eq!(c.restart_interval, Duration::from_secs(5));
        assert_eq!(c.max_restart_attempts, 30);
        assert_eq!(c.kick_window, Duration::from_secs(120));
        assert_eq!(c.kick_threshold, 5);
        assert_eq!(c.table_ttl, TEN_MINUTES);
        assert_eq!(c.forbidden_ttl, ONE_DAY);
    }

    #[test]
    fn test_validated_replaces_zero_durations() {
        let c = SessionConfig {
            handshake_timeout: Duration::ZERO,
            send_poll_interval: Duration::ZERO,
            max_restart_attempts: 0,
            kick_threshold: 0,
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(c.handshake_timeout, Duration::from_secs(8));
        assert_eq!(c.send_poll_interval, Duration::from_millis(5));
        assert_eq!(c.max_restart_attempts, 1);
        assert_eq!(c.kick_threshold, 1);
    }

    #[test]
    fn test_validated_clamps_poll_interval() {
        let c = SessionConfig {
            send_poll_interval: Duration::from_secs(30),
            ..SessionConfig::default()
        }
        .validated();
        assert_eq!(c.send_poll_interval, SessionConfig::MAX_SEND_POLL_INTERVAL);
    }

    #[test]
    fn test_validated_keeps_zero_settle_delays() {
        let c = SessionConfig {
            enter_house_delay: Duration::ZERO,
            restart_delay: Duration::ZERO,
            ..SessionConfig::default()
        }
        .validated();
        assert!(c.enter_house_delay.is_zero());
        assert!(c.restart_delay.is_zero());
    }

    #[test]
    fn test_deserialize_partial_json_fills_defaults() {
        let c: SessionConfig = serde_json::from_str(
            r#"{
                "auth_addr": "auth.example.net:8600",
                "account": "robot01",
                "house_id": 12345,
                "login_mode": "mobile",
                "restart_interval": 2500
            }"#,
        )
        .unwrap();
        assert_eq!(c.auth_addr, "auth.example.net:8600");
        assert_eq!(c.house_id, HouseId(12345));
        assert_eq!(c.login_mode, LoginMode::Mobile);
        assert_eq!(c.restart_interval, Duration::from_millis(2500));
        assert_eq!(c.max_restart_attempts, 30);
    }

    #[test]
    fn test_deserialize_unknown_login_mode_is_error() {
        let err = serde_json::from_str::<SessionConfig>(r#"{"login_mode": "qr"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn test_socket_config_zero_keep_alive_disables() {
        let c = SessionConfig {
            keep_alive: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert_eq!(c.socket_config().keep_alive, None);
        assert_eq!(c.lobby_addr(8601), "127.0.0.1:8601");
    }
}
