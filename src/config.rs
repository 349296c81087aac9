use crate::NumlogError;
use std::path::PathBuf;
use std::time::Duration;

/// Settings fixed at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Handler threads; also the admission capacity.
    pub workers: usize,
    pub report_interval: Duration,
    pub log_path: PathBuf,
    /// Upper bound on waiting for handlers during shutdown.
    pub join_timeout: Duration,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), NumlogError> {
        if self.workers == 0 {
            return Err(NumlogError::Config("worker count must be at least 1".to_string()));
        }
        if self.report_interval.is_zero() {
            return Err(NumlogError::Config("report interval must be non-zero".to_string()));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(NumlogError::Config("log path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        tracing::info!(
            addr = %self.addr(),
            workers = self.workers,
            report_interval = ?self.report_interval,
            log_path = %self.log_path.display(),
            "configuration"
        );
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            workers: 5,
            report_interval: Duration::from_secs(10),
            log_path: PathBuf::from("numbers.log"),
            join_timeout: Duration::from_secs(5),
        }
    }
}
