use crate::admission::AdmissionQueue;
use crate::cancel::CancelToken;
use crate::connection::Connection;
use crate::context::ServerContext;
use crate::token::{Token, trim_line_ending};
use crate::NumlogError;
use crossbeam_channel::Receiver;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest line read before the connection is treated as sending garbage.
const MAX_LINE_BYTES: u64 = 64;

/// One member of the fixed handler pool.
///
/// Idle in `take`, then reading one connection to its end, then idle again. Only shutdown
/// ends the loop; bad input and broken sockets just close the connection at hand.
pub struct Worker<C> {
    id: usize,
    context: Arc<ServerContext>,
    queue: Arc<AdmissionQueue<C>>,
    cancel: CancelToken,
}

impl<C: Connection> Worker<C> {
    pub fn new(id: usize, context: Arc<ServerContext>, queue: Arc<AdmissionQueue<C>>) -> Self {
        let cancel = context.cancel_token();
        Worker {
            id,
            context,
            queue,
            cancel,
        }
    }

    pub fn run(&self) {
        while self.context.is_running() {
            let Some(admitted) = self.queue.take(&self.cancel) else {
                break;
            };
            // Slot frees once the connection is closed and the permit goes out of scope.
            let (connection, _permit) = admitted.into_parts();
            let peer = connection.peer();

            match self.serve(connection) {
                Ok(()) => debug!(worker = self.id, %peer, "client finished"),
                Err(NumlogError::Shutdown) => break,
                Err(err @ NumlogError::MalformedToken(_)) => {
                    info!(worker = self.id, %peer, "{}", err)
                }
                Err(err) => warn!(worker = self.id, %peer, "closing connection: {}", err),
            }
        }
        info!(worker = self.id, "Thread ending: handler-{}", self.id);
    }

    /// Read tokens from one connection until it ends, then close it.
    pub fn serve(&self, connection: C) -> Result<(), NumlogError> {
        let interrupter = match connection.interrupter() {
            Ok(interrupter) => interrupter,
            Err(e) => {
                connection.close();
                return Err(NumlogError::ConnectionIo(e));
            }
        };
        self.context.active().register(self.id, interrupter);

        // Registered before the check: either shutdown sees this read and interrupts it,
        // or we see the flag already down.
        let mut reader = BufReader::new(connection);
        let result = if self.context.is_running() {
            self.read_tokens(&mut reader)
        } else {
            Err(NumlogError::Shutdown)
        };

        self.context.active().deregister(self.id);
        reader.into_inner().close();
        result
    }

    fn read_tokens<R: BufRead>(&self, reader: &mut R) -> Result<(), NumlogError> {
        let mut line = Vec::with_capacity(MAX_LINE_BYTES as usize);
        loop {
            line.clear();
            let read = reader.by_ref().take(MAX_LINE_BYTES).read_until(b'\n', &mut line);
            if !self.context.is_running() {
                return Err(NumlogError::Shutdown);
            }
            match read {
                Ok(0) => return Ok(()),
                Ok(n) if n as u64 == MAX_LINE_BYTES && line.last() != Some(&b'\n') => {
                    return Err(NumlogError::MalformedToken(
                        String::from_utf8_lossy(&line).into_owned(),
                    ));
                }
                Ok(_) => {}
                Err(e) => return Err(NumlogError::ConnectionIo(e)),
            }

            let raw = trim_line_ending(&line);
            if raw.is_empty() {
                return Ok(());
            }
            let token = Token::parse(raw)?;
            self.context.save(token)?;
        }
    }
}

/// The fixed set of handler threads.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    done: Receiver<()>,
}

impl WorkerPool {
    pub fn spawn<C: Connection>(
        size: usize,
        context: Arc<ServerContext>,
        queue: Arc<AdmissionQueue<C>>,
    ) -> Result<Self, NumlogError> {
        // Each thread owns a sender clone; the channel disconnects once all have exited.
        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);
        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let worker = Worker::new(id, Arc::clone(&context), Arc::clone(&queue));
            let done_tx = done_tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("handler-{}", id))
                .spawn(move || {
                    let _done = done_tx;
                    worker.run();
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Handlers already started would otherwise sit in `take` forever.
                    context.stop();
                    context.cancel_all();
                    return Err(e.into());
                }
            }
        }
        Ok(WorkerPool { handles, done })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait up to `timeout` for every worker to exit. Returns how many were still running
    /// when the deadline passed; those threads are left detached.
    pub fn join_timeout(self, timeout: Duration) -> usize {
        // Nothing is ever sent, so this returns on disconnect (all exited) or at the deadline.
        // A timeout too large to be a deadline means wait without one.
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                let _ = self.done.recv_deadline(deadline);
            }
            None => {
                let _ = self.done.recv();
            }
        }

        let mut stragglers = 0;
        for handle in self.handles {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("handler thread panicked");
                }
            } else {
                stragglers += 1;
            }
        }
        stragglers
    }
}
