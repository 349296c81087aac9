use crate::token::Token;
use crate::NumlogError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Append target for first-seen tokens. Shared by every worker.
pub trait TokenSink: Send + Sync {
    /// Append one token as its own line. Concurrent appends never interleave within a line.
    fn append(&self, token: Token) -> Result<(), NumlogError>;
    fn flush(&self) -> Result<(), NumlogError>;
    /// Flush and release the underlying handle. Later appends fail; a second close is a no-op.
    fn close(&self) -> Result<(), NumlogError>;
}

/// Buffered, newline-delimited token log on disk.
pub struct NumberLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl NumberLog {
    /// Create the log, discarding anything left by a previous run.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, NumlogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(NumlogError::Sink)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(NumlogError::Sink)?;
        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> MutexGuard<'_, Option<BufWriter<File>>> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn closed() -> NumlogError {
    NumlogError::Sink(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "number log already closed",
    ))
}

impl TokenSink for NumberLog {
    fn append(&self, token: Token) -> Result<(), NumlogError> {
        let mut guard = self.writer();
        let writer = guard.as_mut().ok_or_else(closed)?;
        // Whole line in one call so a failed write can't leave half a token behind another.
        let line = format!("{}\n", token);
        writer.write_all(line.as_bytes()).map_err(NumlogError::Sink)
    }

    fn flush(&self) -> Result<(), NumlogError> {
        match self.writer().as_mut() {
            Some(writer) => writer.flush().map_err(NumlogError::Sink),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), NumlogError> {
        let Some(mut writer) = self.writer().take() else {
            return Ok(());
        };
        writer.flush().map_err(NumlogError::Sink)?;
        writer.get_ref().sync_all().map_err(NumlogError::Sink)
    }
}

/// In-memory sink for tests and embedding.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<Token>>,
    closed: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        *self
            .closed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenSink for MemorySink {
    fn append(&self, token: Token) -> Result<(), NumlogError> {
        if self.is_closed() {
            return Err(closed());
        }
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(token);
        Ok(())
    }

    fn flush(&self) -> Result<(), NumlogError> {
        Ok(())
    }

    fn close(&self) -> Result<(), NumlogError> {
        *self
            .closed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn token(s: &str) -> Token {
        s.parse().unwrap()
    }

    #[test]
    fn appends_one_line_per_token() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("numbers.log");
        let log = NumberLog::create(&path).unwrap();
        log.append(token("123456789")).unwrap();
        log.append(token("000000001")).unwrap();
        log.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "123456789\n000000001\n");
    }

    #[test]
    fn create_truncates_previous_run() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("numbers.log");
        fs::write(&path, "555555555\n").unwrap();

        let log = NumberLog::create(&path).unwrap();
        log.close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn close_is_idempotent_and_rejects_later_appends() {
        let tmp = tempdir().unwrap();
        let log = NumberLog::create(tmp.path().join("nested/numbers.log")).unwrap();
        log.close().unwrap();
        log.close().unwrap();
        assert!(matches!(log.append(token("111111111")), Err(NumlogError::Sink(_))));
    }

    #[test]
    fn concurrent_appends_stay_whole() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("numbers.log");
        let log = std::sync::Arc::new(NumberLog::create(&path).unwrap());

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let log = std::sync::Arc::clone(&log);
                std::thread::spawn(move || {
                    for i in 0..500u32 {
                        let value = format!("{:09}", t * 1_000 + i);
                        log.append(value.parse().unwrap()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        log.close().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2_000);
        assert!(lines.iter().all(|l| l.parse::<Token>().is_ok()));
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.append(token("000000002")).unwrap();
        sink.append(token("000000001")).unwrap();
        assert_eq!(sink.tokens(), vec![token("000000002"), token("000000001")]);
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(sink.append(token("000000003")).is_err());
    }
}
