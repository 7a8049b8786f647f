//! Configuration for hopper
//!
//! CLI arguments and environment variable handling using clap.

use std::time::Duration;

use clap::Parser;

use crate::queue::QueueConfig;

/// hopper - WebSocket job-queue client
#[derive(Parser, Debug, Clone)]
#[command(name = "hopper")]
#[command(about = "Subscribe to a job channel, pull batches, drain them one at a time")]
pub struct Args {
    /// WebSocket URL of the queue server
    #[arg(long, env = "HOPPER_URL", default_value = "ws://localhost:8080")]
    pub url: String,

    /// Channel to subscribe to for job notifications
    #[arg(long, env = "HOPPER_CHANNEL", default_value = "jobs")]
    pub channel: String,

    /// Drain-loop tick period in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, env = "RECONNECT_DELAY_MS", default_value = "5000")]
    pub reconnect_delay_ms: u64,

    /// Items requested per pull
    #[arg(long, env = "PAGE_SIZE", default_value = "10")]
    pub page_size: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.channel.trim().is_empty() {
            return Err("channel must not be empty".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("POLL_INTERVAL_MS must be greater than zero".to_string());
        }
        if self.reconnect_delay_ms == 0 {
            return Err("RECONNECT_DELAY_MS must be greater than zero".to_string());
        }
        if self.page_size == 0 {
            return Err("PAGE_SIZE must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Build the orchestrator configuration
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            channel: self.channel.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::parse_from(["hopper"])
    }

    #[test]
    fn defaults_are_valid() {
        let args = args();
        assert!(args.validate().is_ok());
        let config = args.queue_config();
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay, Duration::from_millis(5000));
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn rejects_zero_intervals_and_empty_channel() {
        let mut args = args();
        args.poll_interval_ms = 0;
        assert!(args.validate().is_err());

        let mut args = self::args();
        args.channel = "  ".to_string();
        assert!(args.validate().is_err());
    }
}
