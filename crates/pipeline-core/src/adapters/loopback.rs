//! Loopback transport driven by the caller.
//!
//! Sent requests are parked in a queue; whoever holds the transport decides
//! when and in which order they are answered. Useful for scripting arrival
//! orders and for bridging to a responder that lives elsewhere.

use crate::domain::{RemoteError, RequestKind, SequenceId};
use crate::ports::{Delivery, ReplyOrdering, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;

struct Parked<Q> {
    queue: VecDeque<(SequenceId, Q)>,
    next_sequence: u64,
    closed: bool,
}

/// Transport whose replies are injected by hand.
pub struct LoopbackTransport<Q, R> {
    ordering: ReplyOrdering,
    parked: Mutex<Parked<Q>>,
    reply_tx: Mutex<Option<mpsc::UnboundedSender<Delivery<R>>>>,
    reply_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery<R>>>,
}

impl<Q, R> LoopbackTransport<Q, R>
where
    Q: RequestKind + Send + 'static,
    R: Send + 'static,
{
    pub fn new(ordering: ReplyOrdering) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        Self {
            ordering,
            parked: Mutex::new(Parked {
                queue: VecDeque::new(),
                next_sequence: 1,
                closed: false,
            }),
            reply_tx: Mutex::new(Some(reply_tx)),
            reply_rx: tokio::sync::Mutex::new(reply_rx),
        }
    }

    /// Oldest request not yet taken.
    pub fn next_request(&self) -> Option<(SequenceId, Q)> {
        self.parked.lock().queue.pop_front()
    }

    /// Take every parked request in issuance order.
    pub fn take_requests(&self) -> Vec<(SequenceId, Q)> {
        self.parked.lock().queue.drain(..).collect()
    }

    /// Number of parked requests.
    pub fn parked(&self) -> usize {
        self.parked.lock().queue.len()
    }

    /// Deliver a successful reply for `sequence`.
    pub fn reply(&self, sequence: SequenceId, reply: R) -> Result<(), TransportError> {
        self.deliver(Delivery::reply(sequence, reply))
    }

    /// Deliver a remote error for `sequence`.
    pub fn fail(&self, sequence: SequenceId, error: RemoteError) -> Result<(), TransportError> {
        self.deliver(Delivery::error(sequence, error))
    }

    pub fn deliver(&self, delivery: Delivery<R>) -> Result<(), TransportError> {
        let reply_tx = self.reply_tx.lock();
        let tx = reply_tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(delivery).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl<Q, R> Transport for LoopbackTransport<Q, R>
where
    Q: RequestKind + Send + 'static,
    R: Send + 'static,
{
    type Request = Q;
    type Reply = R;

    fn ordering(&self) -> ReplyOrdering {
        self.ordering
    }

    fn send(&self, request: Q) -> Result<SequenceId, TransportError> {
        let mut parked = self.parked.lock();
        if parked.closed {
            return Err(TransportError::Closed);
        }
        let sequence = SequenceId(parked.next_sequence);
        parked.next_sequence += 1;
        parked.queue.push_back((sequence, request));
        Ok(sequence)
    }

    async fn receive(&self) -> Result<Delivery<R>, TransportError> {
        self.reply_rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    fn close(&self) {
        self.parked.lock().closed = true;
        self.reply_tx.lock().take();
    }
}
