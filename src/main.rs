use clap::Parser;
use dotenv::dotenv;
use numlog::config::ServerConfig;
use numlog::{NumlogError, Server};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "numlog")]
#[command(about = "Deduplicating nine-digit number log server", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "NUMLOG_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(short, long, env = "NUMLOG_PORT", default_value_t = 8888)]
    port: u16,
    /// Handler threads, which is also the number of clients served at once
    #[arg(short, long, env = "NUMLOG_WORKERS", default_value_t = 5)]
    workers: usize,
    /// Seconds between throughput reports
    #[arg(long, env = "NUMLOG_REPORT_SECS", default_value_t = 10)]
    report_secs: u64,
    /// File first-seen numbers are appended to (truncated at startup)
    #[arg(long, env = "NUMLOG_LOG_PATH", default_value = "numbers.log")]
    log_path: PathBuf,
    /// Seconds to wait for handlers to finish on shutdown
    #[arg(long, env = "NUMLOG_JOIN_TIMEOUT_SECS", default_value_t = 5)]
    join_timeout_secs: u64,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            workers: self.workers,
            report_interval: Duration::from_secs(self.report_secs),
            log_path: self.log_path,
            join_timeout: Duration::from_secs(self.join_timeout_secs),
        }
    }
}

fn main() -> Result<(), NumlogError> {
    dotenv().ok();
    numlog::init_tracing("numlog");
    let config = Cli::parse().into_config();

    let server = Server::bind(config)?;
    let stop = server.stop_handle();
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))?;

    server.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let config = Cli::parse_from(["numlog"]).into_config();
        let defaults = ServerConfig::default();
        assert_eq!(config.addr(), defaults.addr());
        assert_eq!(config.workers, defaults.workers);
        assert_eq!(config.report_interval, defaults.report_interval);
        assert_eq!(config.log_path, defaults.log_path);
    }

    #[test]
    fn cli_overrides() {
        let config = Cli::parse_from([
            "numlog",
            "--port",
            "9000",
            "-w",
            "3",
            "--report-secs",
            "1",
            "--log-path",
            "/tmp/out.log",
        ])
        .into_config();
        assert_eq!(config.port, 9000);
        assert_eq!(config.workers, 3);
        assert_eq!(config.report_interval, Duration::from_secs(1));
        assert_eq!(config.log_path, PathBuf::from("/tmp/out.log"));
    }
}
