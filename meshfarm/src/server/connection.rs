//! One client connection.
//!
//! ```text
//! Idle ──► AwaitingRequest ──► Dispatching ──► AwaitingCompletion ──► RespondingResult
//!               ▲                   │ (bad request)                         │
//!               │                   └──────────────► RespondingResult       │
//!               └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Each line yields exactly one response line. Protocol and dispatch errors
//! are answered and the connection stays open; only EOF, an I/O error or
//! server shutdown closes it.

use super::dispatch::Dispatcher;
use super::protocol::{ProtocolError, Request, Response};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Where a connection is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    AwaitingRequest,
    Dispatching,
    AwaitingCompletion,
    RespondingResult,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingRequest => "awaiting_request",
            Self::Dispatching => "dispatching",
            Self::AwaitingCompletion => "awaiting_completion",
            Self::RespondingResult => "responding_result",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Connection {
    peer: SocketAddr,
    state: ConnectionState,
    framed: Framed<TcpStream, LinesCodec>,
    max_line_length: usize,
}

impl Connection {
    fn enter(&mut self, next: ConnectionState) {
        trace!(peer = %self.peer, from = %self.state, to = %next, "Connection state");
        self.state = next;
    }

    /// Writes one response; false if the peer is gone.
    async fn respond(&mut self, response: Response) -> bool {
        self.enter(ConnectionState::RespondingResult);
        match self.framed.send(response.to_line()).await {
            Ok(()) => true,
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Failed to write response");
                false
            }
        }
    }
}

/// Serves requests on `stream` until EOF, I/O failure or shutdown.
pub(crate) async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    max_line_length: usize,
    shutdown: CancellationToken,
) {
    let health = dispatcher.health().clone();
    health.connection_opened();
    debug!(peer = %peer, "Client connected");

    let mut conn = Connection {
        peer,
        state: ConnectionState::Idle,
        framed: Framed::new(stream, LinesCodec::new_with_max_length(max_line_length)),
        max_line_length,
    };
    let mut handled: u64 = 0;

    loop {
        conn.enter(ConnectionState::AwaitingRequest);
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = conn.framed.next() => next,
        };

        let line = match next {
            None => break,
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                health.request_received();
                health.protocol_error();
                warn!(peer = %peer, limit = conn.max_line_length, "Request line too long");
                // Framed ends the stream after a decode error. Rebuilding it
                // keeps the codec, which skips the rest of the long line.
                let parts = conn.framed.into_parts();
                conn.framed = Framed::from_parts(parts);
                let response = Response::from(ProtocolError::TooLong(conn.max_line_length));
                if !conn.respond(response).await {
                    break;
                }
                continue;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                debug!(peer = %peer, error = %e, "Connection read failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        health.request_received();
        handled += 1;

        conn.enter(ConnectionState::Dispatching);
        let response = match Request::parse(&line) {
            Ok(request) => {
                debug!(peer = %peer, kind = request.kind(), "Request received");
                conn.enter(ConnectionState::AwaitingCompletion);
                dispatcher.dispatch(request).await
            }
            Err(e) => {
                health.protocol_error();
                debug!(peer = %peer, error = %e, "Rejected request");
                Response::from(e)
            }
        };

        if !conn.respond(response).await {
            break;
        }
    }

    conn.enter(ConnectionState::Closed);
    health.connection_closed();
    info!(peer = %peer, requests = handled, "Client disconnected");
}
