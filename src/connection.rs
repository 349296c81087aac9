use std::io::{self, Read};
use std::net::{Shutdown, TcpStream};

/// One client byte stream as the worker pool sees it.
pub trait Connection: Read + Send + 'static {
    /// Human readable peer, for logs.
    fn peer(&self) -> String;

    /// A handle that can unblock a read pending on this connection from another thread.
    fn interrupter(&self) -> io::Result<Interrupter>;

    fn close(self);
}

/// Wakes a blocked read on a connection by shutting the socket down underneath it.
pub struct Interrupter {
    wake: Box<dyn Fn() + Send>,
}

impl Interrupter {
    pub fn new(wake: impl Fn() + Send + 'static) -> Self {
        Self {
            wake: Box::new(wake),
        }
    }

    pub fn interrupt(&self) {
        (self.wake)()
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Interrupter")
    }
}

impl Connection for TcpStream {
    fn peer(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn interrupter(&self) -> io::Result<Interrupter> {
        let handle = self.try_clone()?;
        Ok(Interrupter::new(move || {
            let _ = handle.shutdown(Shutdown::Both);
        }))
    }

    fn close(self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

#[cfg(unix)]
impl Connection for std::os::unix::net::UnixStream {
    fn peer(&self) -> String {
        self.peer_addr()
            .ok()
            .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "unix".to_string())
    }

    fn interrupter(&self) -> io::Result<Interrupter> {
        let handle = self.try_clone()?;
        Ok(Interrupter::new(move || {
            let _ = handle.shutdown(Shutdown::Both);
        }))
    }

    fn close(self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}
