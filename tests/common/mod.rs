#![allow(dead_code)]

use numlog::admission::AdmissionQueue;
use numlog::config::ServerConfig;
use numlog::context::ServerContext;
use numlog::{NumlogError, Server};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub struct RunningServer {
    pub addr: SocketAddr,
    pub context: Arc<ServerContext>,
    pub queue: Arc<AdmissionQueue<TcpStream>>,
    pub log_path: PathBuf,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), NumlogError>>>,
    _dir: TempDir,
}

impl RunningServer {
    pub fn start(workers: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("numbers.log");
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers,
            report_interval: Duration::from_secs(600),
            log_path: log_path.clone(),
            join_timeout: Duration::from_secs(5),
        };
        let server = Server::bind(config).unwrap();
        let addr = server.local_addr().unwrap();
        let context = server.context();
        let queue = server.queue();
        let stop = server.stop_handle();
        let handle = thread::spawn(move || server.run());
        RunningServer {
            addr,
            context,
            queue,
            log_path,
            stop,
            handle: Some(handle),
            _dir: dir,
        }
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    pub fn send(&self, lines: &[&str]) {
        let mut stream = self.connect();
        for line in lines {
            stream.write_all(format!("{}\n", line).as_bytes()).unwrap();
        }
    }

    /// Signal stop and wait for `run` to return. Panics if draining takes too long.
    pub fn stop(&mut self) -> Result<(), NumlogError> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.handle.take().expect("server already stopped");
        let deadline = Instant::now() + Duration::from_secs(10);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "server did not stop in time");
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().unwrap()
    }

    pub fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log_path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

/// True once the server has closed its side: EOF or a reset.
pub fn closed_by_server(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 16];
    match stream.read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
        ),
    }
}
