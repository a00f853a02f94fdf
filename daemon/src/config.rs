use std::{net::SocketAddr, time::Duration};

use lobby_proto::{frame::LENGTH_PREFIX, FrameConfig};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer limit {max_buffered} can't hold a {max_message_size} byte message")]
    BufferTooSmall {
        max_buffered: usize,
        max_message_size: u32,
    },
    #[error("{0} must be non-zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Where game servers connect
    pub server_listen: SocketAddr,
    /// Where game clients connect
    pub client_listen: SocketAddr,
    /// Read-only JSON listing, if enabled
    pub http_listen: Option<SocketAddr>,
    /// How long a server stays listed after its last heartbeat
    pub liveness_window: Duration,
    /// Connections silent for this long are dropped
    pub idle_timeout: Duration,
    /// How often stale directory entries are evicted
    pub sweep_interval: Duration,
    pub frame: FrameConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_listen: ([0, 0, 0, 0], 27900).into(),
            client_listen: ([0, 0, 0, 0], 27901).into(),
            http_listen: Some(([0, 0, 0, 0], 8080).into()),
            liveness_window: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(60),
            frame: FrameConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.liveness_window.is_zero() {
            return Err(ConfigError::Zero("liveness window"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle timeout"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Zero("sweep interval"));
        }
        if self.frame.max_buffered < self.frame.max_message_size as usize + LENGTH_PREFIX {
            return Err(ConfigError::BufferTooSmall {
                max_buffered: self.frame.max_buffered,
                max_message_size: self.frame.max_message_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn buffer_must_hold_a_message() {
        let mut config = Config::default();
        config.frame = FrameConfig {
            max_message_size: 1024,
            max_buffered: 1027,
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BufferTooSmall {
                max_buffered: 1027,
                max_message_size: 1024
            })
        );
        config.frame.max_buffered = 1028;
        config.validate().unwrap();
    }

    #[test]
    fn zero_durations_rejected() {
        let config = Config {
            idle_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("idle timeout")));
    }
}
