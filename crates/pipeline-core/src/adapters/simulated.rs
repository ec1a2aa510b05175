//! Simulated transport with a configurable latency model.
//!
//! Requests travel over an unbounded in-process channel to a server task that
//! answers them through a [`Responder`] once their latency has elapsed. The
//! number of requests in flight is unlimited, so pipelined usage pays the
//! latency roughly once while submit-then-collect usage pays it per request.
//!
//! In `Fifo` mode the server answers strictly in issuance order. In `Tagged`
//! mode every request is answered independently, so jittered latencies make
//! replies overtake each other.

use crate::domain::{RemoteError, RequestKind, SequenceId};
use crate::ports::{Delivery, ReplyOrdering, Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// The remote side of a simulated connection.
pub trait Responder: Send + Sync + 'static {
    type Request: RequestKind + Send + 'static;
    type Reply: Send + 'static;

    /// Produce the reply (or error) for one request.
    fn respond(&self, request: Self::Request) -> Result<Self::Reply, RemoteError>;
}

/// Per-request delay between send and reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatencyModel {
    /// Every request takes exactly this long.
    Fixed(Duration),
    /// `base` plus a uniformly random extra delay in `[0, jitter]`.
    Jittered { base: Duration, jitter: Duration },
}

impl LatencyModel {
    /// No delay at all.
    pub const ZERO: LatencyModel = LatencyModel::Fixed(Duration::ZERO);

    pub fn sample(&self) -> Duration {
        match *self {
            Self::Fixed(latency) => latency,
            Self::Jittered { base, jitter } => {
                let nanos = jitter.as_nanos().min(u64::MAX as u128) as u64;
                if nanos == 0 {
                    base
                } else {
                    base + Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
                }
            }
        }
    }

    /// Lower bound of any sampled latency.
    pub fn base(&self) -> Duration {
        match *self {
            Self::Fixed(latency) => latency,
            Self::Jittered { base, .. } => base,
        }
    }
}

struct Envelope<Q> {
    sequence: SequenceId,
    request: Q,
    due: Instant,
}

struct Outbound<Q> {
    sender: Option<mpsc::UnboundedSender<Envelope<Q>>>,
    next_sequence: u64,
}

/// In-process transport backed by a [`Responder`].
///
/// Must be created inside a tokio runtime: the server task is spawned on
/// construction.
pub struct SimulatedTransport<S: Responder> {
    ordering: ReplyOrdering,
    latency: LatencyModel,
    outbound: Mutex<Outbound<S::Request>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery<S::Reply>>>,
}

impl<S: Responder> SimulatedTransport<S> {
    pub fn new(responder: Arc<S>, latency: LatencyModel, ordering: ReplyOrdering) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        tokio::spawn(serve(responder, request_rx, reply_tx, ordering));

        Self {
            ordering,
            latency,
            outbound: Mutex::new(Outbound {
                sender: Some(request_tx),
                next_sequence: 1,
            }),
            inbound: tokio::sync::Mutex::new(reply_rx),
        }
    }

    /// FIFO transport with a fixed latency.
    pub fn fifo(responder: Arc<S>, latency: Duration) -> Self {
        Self::new(responder, LatencyModel::Fixed(latency), ReplyOrdering::Fifo)
    }

    pub fn latency(&self) -> LatencyModel {
        self.latency
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.lock().sender.is_none()
    }
}

#[async_trait]
impl<S: Responder> Transport for SimulatedTransport<S> {
    type Request = S::Request;
    type Reply = S::Reply;

    fn ordering(&self) -> ReplyOrdering {
        self.ordering
    }

    fn send(&self, request: Self::Request) -> Result<SequenceId, TransportError> {
        let mut outbound = self.outbound.lock();
        let sequence = SequenceId(outbound.next_sequence);
        let sender = outbound.sender.as_ref().ok_or(TransportError::Closed)?;

        let envelope = Envelope {
            sequence,
            request,
            due: Instant::now() + self.latency.sample(),
        };
        sender
            .send(envelope)
            .map_err(|_| TransportError::SendFailed("server task stopped".into()))?;

        outbound.next_sequence += 1;
        Ok(sequence)
    }

    async fn receive(&self) -> Result<Delivery<Self::Reply>, TransportError> {
        self.inbound.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    fn close(&self) {
        if self.outbound.lock().sender.take().is_some() {
            debug!("Simulated transport closed");
        }
    }
}

/// Server side: answer each request once it is due.
async fn serve<S: Responder>(
    responder: Arc<S>,
    mut requests: mpsc::UnboundedReceiver<Envelope<S::Request>>,
    replies: mpsc::UnboundedSender<Delivery<S::Reply>>,
    ordering: ReplyOrdering,
) {
    while let Some(envelope) = requests.recv().await {
        match ordering {
            ReplyOrdering::Fifo => {
                sleep_until(envelope.due).await;
                let outcome = responder.respond(envelope.request);
                if replies
                    .send(Delivery {
                        sequence: envelope.sequence,
                        outcome,
                    })
                    .is_err()
                {
                    break;
                }
            }
            ReplyOrdering::Tagged => {
                let responder = responder.clone();
                let replies = replies.clone();
                tokio::spawn(async move {
                    sleep_until(envelope.due).await;
                    let outcome = responder.respond(envelope.request);
                    let _ = replies.send(Delivery {
                        sequence: envelope.sequence,
                        outcome,
                    });
                });
            }
        }
    }
}
