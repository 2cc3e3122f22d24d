use std::{io, mem, time::Duration};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tracing::{debug, trace};

use crate::{
    error::SendError,
    item::Item,
    protocol::{self, Acknowledgement},
    transport::Connector,
};

const READ_BUF_SIZE: usize = 4096;

/// Notifications delivered by the transport during a single round trip.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    /// The connection was established.
    Connected,

    /// A chunk of the response arrived.
    Data(Bytes),

    /// The round trip deadline passed.
    Timeout,

    /// The transport failed.
    Error(io::Error),

    /// The connection is closed, and no further events will follow.
    Closed,
}

/// What the driver should do after an event has been handled.
#[derive(Debug)]
pub(crate) enum Step {
    /// Write the request frame to the connection.
    Write(Bytes),

    /// Forcibly terminate the connection, then report `Closed`.
    Terminate,

    /// Keep waiting for events.
    Wait,

    /// The round trip is over.
    Finished(Outcome),
}

/// Terminal result of a session, along with the batch it carried.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub result: Result<Acknowledgement, SendError>,
    pub batch: Vec<Item>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    // Waiting for the connection to be established.
    Connecting,

    // Request written (or being written), collecting the response.
    AwaitingResponse,

    // An error was recorded and termination was requested; only `Closed` matters now.
    Closing,

    // The outcome has been produced.
    Done,
}

/// State machine for one send round trip.
///
/// The session owns the batch and its encoded frame, accumulates the response, and records the first error it sees.
/// An outcome is produced exactly once, when the transport reports `Closed`; every event after that is ignored.
pub(crate) struct Session {
    phase: Phase,
    frame: Option<Bytes>,
    batch: Vec<Item>,
    response: BytesMut,
    error: Option<SendError>,
    timeout: Duration,
}

impl Session {
    pub fn new(batch: Vec<Item>, frame: Bytes, timeout: Duration) -> Self {
        Session {
            phase: Phase::Connecting,
            frame: Some(frame),
            batch,
            response: BytesMut::new(),
            error: None,
            timeout,
        }
    }

    /// Advances the session with the given event.
    pub fn handle(&mut self, event: TransportEvent) -> Step {
        if self.phase == Phase::Done {
            trace!(?event, "Ignoring event for finished session.");
            return Step::Wait;
        }

        match event {
            TransportEvent::Connected => match (self.phase, self.frame.take()) {
                (Phase::Connecting, Some(frame)) => {
                    self.phase = Phase::AwaitingResponse;
                    Step::Write(frame)
                }
                _ => Step::Wait,
            },
            TransportEvent::Data(chunk) => {
                if self.phase == Phase::AwaitingResponse {
                    self.response.extend_from_slice(&chunk);
                }
                Step::Wait
            }
            TransportEvent::Timeout => self.fail(SendError::Timeout(self.timeout)),
            TransportEvent::Error(e) => self.fail(SendError::Transport(e)),
            TransportEvent::Closed => {
                self.phase = Phase::Done;
                Step::Finished(self.finish())
            }
        }
    }

    fn fail(&mut self, error: SendError) -> Step {
        // The first error wins.
        if self.error.is_none() {
            self.error = Some(error);
        }

        self.phase = Phase::Closing;
        Step::Terminate
    }

    fn finish(&mut self) -> Outcome {
        let batch = mem::take(&mut self.batch);
        let result = match self.error.take() {
            Some(e) => Err(e),
            None => protocol::decode(&self.response).map_err(SendError::from),
        };

        Outcome { result, batch }
    }
}

/// Drives `session` over a fresh connection to `host:port`.
///
/// A single deadline of `timeout` covers connecting, writing the request, and reading the response.
pub(crate) async fn drive<C>(
    connector: &C,
    host: &str,
    port: u16,
    timeout: Duration,
    mut session: Session,
) -> Outcome
where
    C: Connector,
{
    let timer = tokio::time::sleep(timeout);
    tokio::pin!(timer);
    let mut timer_armed = true;

    let mut connecting = Some(connector.connect(host, port));
    let mut stream: Option<C::Stream> = None;
    let mut read_buf = BytesMut::with_capacity(READ_BUF_SIZE);
    let mut pending: Option<TransportEvent> = None;

    loop {
        let event = if let Some(event) = pending.take() {
            event
        } else if let Some(fut) = connecting.as_mut() {
            let result = tokio::select! {
                result = fut => Some(result),
                () = &mut timer, if timer_armed => None,
            };

            match result {
                Some(Ok(conn)) => {
                    connecting = None;
                    stream = Some(conn);
                    TransportEvent::Connected
                }
                Some(Err(e)) => {
                    connecting = None;
                    TransportEvent::Error(e)
                }
                None => {
                    timer_armed = false;
                    TransportEvent::Timeout
                }
            }
        } else if let Some(conn) = stream.as_mut() {
            let result = tokio::select! {
                result = conn.read_buf(&mut read_buf) => Some(result),
                () = &mut timer, if timer_armed => None,
            };

            match result {
                Some(Ok(0)) => {
                    stream = None;
                    TransportEvent::Closed
                }
                Some(Ok(n)) => {
                    trace!(bytes = n, "Received response chunk.");
                    TransportEvent::Data(read_buf.split().freeze())
                }
                Some(Err(e)) => TransportEvent::Error(e),
                None => {
                    timer_armed = false;
                    TransportEvent::Timeout
                }
            }
        } else {
            TransportEvent::Closed
        };

        match session.handle(event) {
            Step::Write(frame) => {
                let Some(conn) = stream.as_mut() else {
                    continue;
                };

                let result = tokio::select! {
                    result = conn.write_all(&frame) => Some(result),
                    () = &mut timer, if timer_armed => None,
                };

                match result {
                    Some(Ok(())) => debug!(bytes = frame.len(), "Wrote request frame."),
                    Some(Err(e)) => pending = Some(TransportEvent::Error(e)),
                    None => {
                        timer_armed = false;
                        pending = Some(TransportEvent::Timeout);
                    }
                }
            }
            Step::Terminate => {
                // Dropping the connection closes it; the next iteration reports `Closed`.
                connecting = None;
                stream = None;
            }
            Step::Wait => {}
            Step::Finished(outcome) => return outcome,
        }
    }
}
