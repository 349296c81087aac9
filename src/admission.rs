use crate::cancel::CancelToken;
use crossbeam_channel::{Receiver, Sender, select_biased};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returned by `offer` when no slot is free. Hands the connection back so the caller can
/// close it.
pub struct QueueFull<C>(pub C);

impl<C> fmt::Debug for QueueFull<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull")
    }
}

/// Holds one admission slot. The slot frees when this is dropped, which a worker does after
/// it has closed the connection.
pub struct Permit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct Admitted<C> {
    connection: C,
    permit: Permit,
}

impl<C> Admitted<C> {
    pub fn into_parts(self) -> (C, Permit) {
        (self.connection, self.permit)
    }
}

/// Bounded handoff between the acceptor and the worker pool.
///
/// Capacity counts a connection from the moment it is admitted until its worker drops the
/// permit, so queued plus in-service connections never exceed `capacity`.
pub struct AdmissionQueue<C> {
    sender: Sender<Admitted<C>>,
    receiver: Receiver<Admitted<C>>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl<C> AdmissionQueue<C> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Never blocks.
    pub fn offer(&self, connection: C) -> Result<(), QueueFull<C>> {
        let acquired = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();
        if !acquired {
            return Err(QueueFull(connection));
        }

        let admitted = Admitted {
            connection,
            permit: Permit {
                in_flight: Arc::clone(&self.in_flight),
            },
        };
        // The channel is as large as the permit pool, so this only fails if it is
        // disconnected; the permit is released as the rejected item drops.
        self.sender
            .try_send(admitted)
            .map_err(|e| QueueFull(e.into_inner().connection))
    }

    /// Block until a connection is available or `cancel` fires. Cancellation wins when both
    /// are ready, so nothing is dequeued once shutdown has begun.
    pub fn take(&self, cancel: &CancelToken) -> Option<Admitted<C>> {
        select_biased! {
            recv(cancel.receiver()) -> _ => None,
            recv(self.receiver) -> admitted => admitted.ok(),
        }
    }

    /// Remove everything still waiting. Used at shutdown to close unserved connections.
    pub fn drain(&self) -> Vec<C> {
        self.receiver
            .try_iter()
            .map(|admitted| admitted.connection)
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Connections admitted and not yet released by a worker.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Connections admitted but not yet picked up by a worker.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
