//! Process configuration: bind address, session lifecycle timings, and
//! shutdown grace period, as CLI flags with environment fallbacks via
//! `clap`'s `env` feature.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "wavecast-server", about = "Real-time speech-to-text streaming server")]
pub struct Settings {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "WAVECAST_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Idle session timeout in seconds before the reaper removes it.
    #[arg(long, env = "WAVECAST_SESSION_MAX_AGE_SECS", default_value_t = 30 * 60)]
    pub session_max_age_secs: u64,

    /// Reaper sweep interval in seconds.
    #[arg(long, env = "WAVECAST_REAP_INTERVAL_SECS", default_value_t = 60)]
    pub reap_interval_secs: u64,

    /// Grace period for in-flight dispatcher tasks during shutdown.
    #[arg(long, env = "WAVECAST_SHUTDOWN_GRACE_SECS", default_value_t = 2)]
    pub shutdown_grace_secs: u64,
}

impl Settings {
    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let settings = Settings::parse_from(["wavecast-server"]);
        assert_eq!(settings.session_max_age_secs, 30 * 60);
        assert_eq!(settings.reap_interval_secs, 60);
        assert_eq!(settings.shutdown_grace_secs, 2);
    }
}
