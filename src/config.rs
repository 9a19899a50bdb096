use std::time::Duration;

use clap::Parser;

use crate::ledger::pow::MAX_DIFFICULTY;
use crate::ledger::DEFAULT_DIFFICULTY;

/// Command line and environment configuration for the ledger server
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pow_ledger",
    version,
    about = "A minimal proof-of-work ledger served over HTTP"
)]
pub struct Config {
    /// Interface to bind the HTTP server to
    #[arg(long, env = "LEDGER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Listening port number
    #[arg(short, long, env = "LEDGER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Leading zero hex nibbles a proof digest must have
    #[arg(
        short,
        long,
        env = "LEDGER_DIFFICULTY",
        default_value_t = DEFAULT_DIFFICULTY,
        value_parser = clap::value_parser!(u8).range(0..=MAX_DIFFICULTY as i64)
    )]
    pub difficulty: u8,

    /// Seconds a single /mine request may search before it is cancelled
    #[arg(long, env = "LEDGER_MINE_TIMEOUT_SECS", default_value_t = 60)]
    pub mine_timeout_secs: u64,
}

impl Config {
    pub fn mine_timeout(&self) -> Duration {
        Duration::from_secs(self.mine_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["pow_ledger"]).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(config.mine_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "pow_ledger",
            "--port",
            "9090",
            "--difficulty",
            "2",
            "--mine-timeout-secs",
            "5",
        ])
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.mine_timeout_secs, 5);
    }

    #[test]
    fn test_difficulty_out_of_range_is_rejected() {
        assert!(Config::try_parse_from(["pow_ledger", "--difficulty", "65"]).is_err());
    }
}
