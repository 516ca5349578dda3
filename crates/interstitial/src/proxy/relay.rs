//! Streaming relay from the upstream response body to the client
//!
//! A pump task reads upstream fragments and hands them to the client body
//! through a channel with a single slot. The pump only pulls the next
//! fragment once the client has taken the previous one, so at most one
//! fragment is in flight regardless of stream length.
//!
//! The pump stops as soon as the client body is dropped, which drops the
//! upstream stream and releases its connection.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use super::upstream::{UpstreamClient, UpstreamError};

/// Stream handed to the client response body
pub type ClientStream = ReceiverStream<Result<Bytes, std::io::Error>>;

/// Terminal state of a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream body exhausted, client stream closed normally
    Completed { fragments: usize },
    /// Client went away before the upstream body was exhausted
    ClientAborted { fragments: usize },
    /// Upstream answered with a non-2xx status; one diagnostic fragment sent
    Rejected { status: u16 },
    /// Upstream transfer failed after streaming started
    UpstreamFailed { fragments: usize, message: String },
}

impl RelayOutcome {
    fn log(&self) {
        match self {
            RelayOutcome::Completed { fragments } => {
                tracing::info!(fragments, "Upstream stream completed");
            }
            RelayOutcome::ClientAborted { fragments } => {
                tracing::info!(fragments, "Client disconnected, closing upstream stream");
            }
            RelayOutcome::Rejected { status } => {
                tracing::warn!(status, "Upstream rejected request");
            }
            RelayOutcome::UpstreamFailed { fragments, message } => {
                tracing::error!(
                    error_type = "upstream",
                    fragments,
                    error_message = %message,
                    "Upstream stream failed mid-transfer"
                );
            }
        }
    }
}

/// Handle to retrieve the relay's terminal state once it finishes
pub struct OutcomeHandle {
    receiver: oneshot::Receiver<RelayOutcome>,
}

impl OutcomeHandle {
    /// Wait for the relay to finish
    ///
    /// Returns `None` if the pump task was cancelled before reporting.
    pub async fn wait(self) -> Option<RelayOutcome> {
        self.receiver.await.ok()
    }
}

/// A started relay: the client-facing stream plus its outcome handle
pub struct Relay {
    /// Forward this to the client response body
    pub client_stream: ClientStream,
    /// Resolves when the relay reaches a terminal state
    pub outcome: OutcomeHandle,
}

/// Streaming relay functionality
pub struct StreamRelay;

impl StreamRelay {
    /// Issue the streamed upstream call and start relaying its body
    ///
    /// Network failures (timeout, refused connection, a body that breaks off
    /// before its first fragment) are returned as errors before anything
    /// reaches the client. A non-2xx answer still yields a relay, carrying a
    /// single `Error: <body>` fragment.
    pub async fn connect(
        upstream: &UpstreamClient,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Relay, UpstreamError> {
        let response = upstream.call_streamed(payload, timeout).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| e.to_string());
            return Ok(Self::reject(status.as_u16(), &body));
        }

        // Hold the response back until the first fragment arrives, so a stall
        // or a dropped connection is still reported as an error
        let mut fragments = Box::pin(response.into_fragments());
        let first = match tokio::time::timeout(timeout, fragments.next()).await {
            Err(_) => return Err(UpstreamError::Timeout),
            Ok(Some(Err(e))) => return Err(UpstreamError::from_reqwest(e)),
            Ok(Some(Ok(chunk))) => Some(chunk),
            Ok(None) => None,
        };

        Ok(Self::spawn(stream::iter(first.map(Ok)).chain(fragments)))
    }

    /// Start a pump task forwarding `incoming` to a fresh client stream
    pub fn spawn<S, E>(incoming: S) -> Relay
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        tokio::spawn(
            async move {
                let outcome = pump(incoming, tx).await;
                outcome.log();
                let _ = outcome_tx.send(outcome);
            }
            .in_current_span(),
        );

        Relay {
            client_stream: ReceiverStream::new(rx),
            outcome: OutcomeHandle {
                receiver: outcome_rx,
            },
        }
    }

    /// Build a finished relay holding only the diagnostic fragment
    pub fn reject(status: u16, body: &str) -> Relay {
        let (tx, rx) = mpsc::channel(1);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        // The slot is free on a fresh channel, so this cannot fail
        let _ = tx.try_send(Ok(diagnostic_fragment(body)));

        let outcome = RelayOutcome::Rejected { status };
        outcome.log();
        let _ = outcome_tx.send(outcome);

        Relay {
            client_stream: ReceiverStream::new(rx),
            outcome: OutcomeHandle {
                receiver: outcome_rx,
            },
        }
    }
}

/// Text sent in place of the content stream when the upstream rejects a request
pub fn diagnostic_fragment(body: &str) -> Bytes {
    Bytes::from(format!("Error: {body}"))
}

async fn pump<S, E>(incoming: S, tx: mpsc::Sender<Result<Bytes, std::io::Error>>) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut incoming = std::pin::pin!(incoming);
    let mut fragments = 0usize;

    loop {
        // Wait until the client has taken the previous fragment
        let Ok(permit) = tx.reserve().await else {
            return RelayOutcome::ClientAborted { fragments };
        };

        let next = tokio::select! {
            _ = tx.closed() => return RelayOutcome::ClientAborted { fragments },
            next = incoming.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                tracing::trace!(len = chunk.len(), "Forwarding upstream fragment");
                permit.send(Ok(chunk));
                fragments += 1;
            }
            Some(Err(e)) => {
                return RelayOutcome::UpstreamFailed {
                    fragments,
                    message: e.to_string(),
                };
            }
            None => return RelayOutcome::Completed { fragments },
        }
    }
}
