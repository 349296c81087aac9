use crate::admission::{AdmissionQueue, QueueFull};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::context::ServerContext;
use crate::reporter::Reporter;
use crate::shutdown::ShutdownCoordinator;
use crate::sink::{NumberLog, TokenSink};
use crate::worker::WorkerPool;
use crate::NumlogError;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// How long the acceptor sleeps when no connection is pending before rechecking for stop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A bound TCP listener plus everything needed to serve it.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    context: Arc<ServerContext>,
    queue: Arc<AdmissionQueue<TcpStream>>,
    stop_requested: Arc<AtomicBool>,
}

impl Server {
    /// Bind the listener and create a fresh number log at `config.log_path`.
    pub fn bind(config: ServerConfig) -> Result<Self, NumlogError> {
        config.validate()?;
        let sink = Arc::new(NumberLog::create(&config.log_path)?);
        Self::with_sink(config, sink)
    }

    pub fn with_sink(config: ServerConfig, sink: Arc<dyn TokenSink>) -> Result<Self, NumlogError> {
        config.validate()?;
        let listener = TcpListener::bind(config.addr()).map_err(NumlogError::AcceptorFatal)?;
        let context = Arc::new(ServerContext::new(sink));
        let queue = Arc::new(AdmissionQueue::new(config.workers));
        Ok(Server {
            listener,
            config,
            context,
            queue,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NumlogError> {
        self.listener.local_addr().map_err(NumlogError::Io)
    }

    /// Setting this flag (from a signal handler or another thread) makes `run` drain and
    /// return.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    pub fn queue(&self) -> Arc<AdmissionQueue<TcpStream>> {
        Arc::clone(&self.queue)
    }

    /// Serve until stop is requested or the listener fails, then shut down.
    /// A listener failure is returned after the drain completes.
    pub fn run(self) -> Result<(), NumlogError> {
        self.config.print_summary();

        info!("starting handlers");
        let workers = WorkerPool::spawn(
            self.config.workers,
            Arc::clone(&self.context),
            Arc::clone(&self.queue),
        )?;
        let reporter =
            Reporter::new(Arc::clone(&self.context), self.config.report_interval).spawn();
        let (reporter, started) = match reporter {
            Ok(handle) => (Some(handle), Ok(())),
            Err(e) => (None, Err(e)),
        };
        let coordinator = ShutdownCoordinator::new(
            Arc::clone(&self.context),
            Arc::clone(&self.queue),
            workers,
            reporter,
            self.config.join_timeout,
        );

        let served = started.and_then(|()| {
            info!(addr = %self.local_addr()?, "starting server");
            self.accept_loop()
        });
        drain_after(served, &coordinator)
    }

    fn accept_loop(&self) -> Result<(), NumlogError> {
        self.listener
            .set_nonblocking(true)
            .map_err(NumlogError::AcceptorFatal)?;

        loop {
            if self.stop_requested.load(Ordering::Relaxed) || !self.context.is_running() {
                info!("shutdown requested");
                return Ok(());
            }

            match self.listener.accept() {
                Ok((stream, _)) => self.admit(stream),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if is_transient_accept_error(e) => {
                    warn!("accept error: {}", e);
                }
                Err(e) => return Err(NumlogError::AcceptorFatal(e)),
            }
        }
    }

    fn admit(&self, stream: TcpStream) {
        let peer = stream.peer();
        // Accepted sockets can inherit the listener's non-blocking mode.
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(%peer, "dropping client: {}", e);
            stream.close();
            return;
        }
        match self.queue.offer(stream) {
            Ok(()) => info!(%peer, "accepted"),
            Err(QueueFull(stream)) => {
                info!(%peer, "rejecting client");
                stream.close();
            }
        }
    }
}

/// Shut down whatever way serving ended. A serving error still drains first, then wins over
/// any shutdown error.
fn drain_after<C: Connection>(
    served: Result<(), NumlogError>,
    coordinator: &ShutdownCoordinator<C>,
) -> Result<(), NumlogError> {
    if let Err(ref e) = served {
        error!("{}", e);
    }
    let drained = coordinator.shutdown();
    served?;
    drained.map(|_| ())
}

fn is_transient_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Interrupted | ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
    )
}
