use std::fmt;

#[derive(Debug)]
pub enum NumlogError {
    /// A line that is not exactly nine ASCII digits.
    MalformedToken(String),
    ConnectionIo(std::io::Error),
    QueueFull,
    /// Cancellation observed while blocked. Control flow, not a failure.
    Shutdown,
    AcceptorFatal(std::io::Error),
    Sink(std::io::Error),
    Config(String),
    Io(std::io::Error),
    Other(String),
}

impl NumlogError {
    /// Errors a worker recovers from by closing the connection and going back to idle.
    pub fn is_connection_local(&self) -> bool {
        matches!(
            self,
            NumlogError::MalformedToken(_) | NumlogError::ConnectionIo(_)
        )
    }
}

impl fmt::Display for NumlogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumlogError::MalformedToken(line) => write!(f, "Bad token: {}", line),
            NumlogError::ConnectionIo(e) => write!(f, "Connection IO error: {}", e),
            NumlogError::QueueFull => write!(f, "Admission queue full"),
            NumlogError::Shutdown => write!(f, "Shutting down"),
            NumlogError::AcceptorFatal(e) => write!(f, "Acceptor failed: {}", e),
            NumlogError::Sink(e) => write!(f, "Sink error: {}", e),
            NumlogError::Config(e) => write!(f, "Config error: {}", e),
            NumlogError::Io(e) => write!(f, "IO error: {}", e),
            NumlogError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for NumlogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NumlogError::ConnectionIo(e)
            | NumlogError::AcceptorFatal(e)
            | NumlogError::Sink(e)
            | NumlogError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NumlogError {
    fn from(err: std::io::Error) -> Self {
        NumlogError::Io(err)
    }
}

impl From<String> for NumlogError {
    fn from(err: String) -> Self {
        NumlogError::Other(err)
    }
}

impl From<&str> for NumlogError {
    fn from(err: &str) -> Self {
        NumlogError::Other(err.to_string())
    }
}
