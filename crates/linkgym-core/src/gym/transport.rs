//! Transport seam between the step loop and the external decision process
//!
//! The loop assumes a reliable duplex channel but no delivery guarantee:
//! `send` is fire-and-forget and `receive` blocks for at most the given
//! timeout. An unavailable channel degrades every wait to "no action"
//! instead of failing the loop.

use super::measure::{Action, Measurement};
use crate::error::Result;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Duplex exchange channel used by the step loop
pub trait Transport {
    /// Emit a measurement batch. Fire-and-forget; the core assumes no
    /// delivery guarantee.
    fn send(&mut self, batch: &[Measurement]) -> Result<()>;

    /// Block for up to `timeout` awaiting an inward action. `None` covers
    /// both "nothing arrived in time" and an unavailable channel.
    fn receive(&mut self, timeout: Duration) -> Option<Action>;
}

/// Transport for running without an external process: sends vanish and
/// every wait resolves to "none" immediately.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, _batch: &[Measurement]) -> Result<()> {
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Option<Action> {
        None
    }
}

/// In-process transport over a channel pair, for tests and built-in agents
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Sender<Vec<Measurement>>,
    rx: Receiver<Action>,
}

/// The decision-process side of a [`ChannelTransport`]
#[derive(Debug)]
pub struct AgentEndpoint {
    /// Batches emitted by the step loop
    pub measurements: Receiver<Vec<Measurement>>,
    /// Actions pushed back into the loop
    pub actions: Sender<Action>,
}

impl ChannelTransport {
    /// Create a connected (loop side, agent side) pair
    pub fn pair() -> (Self, AgentEndpoint) {
        let (meas_tx, meas_rx) = mpsc::channel();
        let (act_tx, act_rx) = mpsc::channel();
        (
            Self { tx: meas_tx, rx: act_rx },
            AgentEndpoint { measurements: meas_rx, actions: act_tx },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, batch: &[Measurement]) -> Result<()> {
        // A hung-up agent is a degraded channel, not an error.
        if self.tx.send(batch.to_vec()).is_err() {
            tracing::warn!("agent endpoint gone, dropping measurement batch");
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Option<Action> {
        match self.rx.recv_timeout(timeout) {
            Ok(action) => Some(action),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Newline-delimited JSON over TCP, the shape of the external bridge
#[derive(Debug)]
pub struct TcpTransport {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpTransport {
    /// Wrap an established connection
    pub fn new(stream: TcpStream) -> Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { writer: stream, reader })
    }

    /// Connect to an external decision process
    pub fn connect(addr: &str) -> Result<Self> {
        Self::new(TcpStream::connect(addr)?)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, batch: &[Measurement]) -> Result<()> {
        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');
        // An unreachable peer degrades the loop; it does not stop it.
        if let Err(e) = self.writer.write_all(&line) {
            tracing::warn!(error = %e, "peer unreachable, dropping measurement batch");
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Option<Action> {
        // A zero timeout would mean "block forever" to the socket API.
        let timeout = timeout.max(Duration::from_millis(1));
        if self.reader.get_ref().set_read_timeout(Some(timeout)).is_err() {
            return None;
        }
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None, // peer closed
            Ok(_) => match serde_json::from_str(&line) {
                Ok(action) => Some(action),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed action");
                    None
                }
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
            Err(e) => {
                tracing::warn!(error = %e, "transport read failed");
                None
            }
        }
    }
}
