//! # Network Module
//!
//! This module provides the message channel abstraction used to talk to the operator console,
//! along with two transports:
//!
//! - [`LocalChannel`] - an in-process pair of connected channels.
//! - [`StdioChannel`] - JSON lines over the process's standard streams. Input lines may either be
//!   JSON encoded messages or bare command tokens such as `Dw`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::{self, BufRead, BufReader, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use log::{debug, warn};
use thiserror::Error;

use crate::msg::{Message, MsgError};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A bidirectional channel of [`Message`]s.
pub trait MsgChannel: Send + Sync {
    /// Send a message to the other end of the channel.
    fn send(&self, msg: Message) -> Result<(), NetError>;

    /// Wait up to `timeout` for a message, returning `Ok(None)` if nothing arrived.
    ///
    /// Once the other end has gone away and all buffered messages have been received this returns
    /// [`NetError::Disconnected`].
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Message>, NetError>;

    /// Returns true while the other end of the channel is still present.
    fn is_connected(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One end of an in-process message channel.
pub struct LocalChannel {
    tx: Mutex<Sender<Message>>,
    rx: Mutex<Receiver<Message>>,
    connected: AtomicBool,
}

/// A message channel over a line based byte stream, usually stdin/stdout.
pub struct StdioChannel {
    writer: Mutex<Box<dyn Write + Send>>,
    rx: Mutex<Receiver<Message>>,
    connected: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum NetError {
    #[error("The other end of the channel has disconnected")]
    Disconnected,

    #[error("A channel lock was poisoned")]
    LockPoisoned,

    #[error("Could not write the message: {0}")]
    WriteError(io::Error),

    #[error("Message error: {0}")]
    MsgError(MsgError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LocalChannel {
    /// Create a pair of connected channels. A message sent on one is received on the other.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();

        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: Sender<Message>, rx: Receiver<Message>) -> Self {
        Self {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            connected: AtomicBool::new(true),
        }
    }

    /// Receive every message currently waiting on the channel without blocking.
    pub fn drain(&self) -> Vec<Message> {
        match self.rx.lock() {
            Ok(rx) => rx.try_iter().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl MsgChannel for LocalChannel {
    fn send(&self, msg: Message) -> Result<(), NetError> {
        let tx = self.tx.lock().map_err(|_| NetError::LockPoisoned)?;

        tx.send(msg).map_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
            NetError::Disconnected
        })
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Message>, NetError> {
        let rx = self.rx.lock().map_err(|_| NetError::LockPoisoned)?;

        recv_or_disconnect(&rx, timeout, &self.connected)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl StdioChannel {
    /// Start a channel on the process's stdin and stdout.
    pub fn start() -> Self {
        Self::from_io(BufReader::new(io::stdin()), io::stdout())
    }

    /// Start a channel reading lines from `reader` and writing lines to `writer`.
    ///
    /// A background thread reads the input until the end of the stream, at which point the
    /// channel is marked as disconnected.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let connected = Arc::new(AtomicBool::new(true));

        let connected_clone = connected.clone();
        thread::spawn(move || reader_thread(reader, tx, connected_clone));

        Self {
            writer: Mutex::new(Box::new(writer)),
            rx: Mutex::new(rx),
            connected,
        }
    }
}

impl MsgChannel for StdioChannel {
    fn send(&self, msg: Message) -> Result<(), NetError> {
        let json = msg.to_json().map_err(NetError::MsgError)?;

        let mut writer = self.writer.lock().map_err(|_| NetError::LockPoisoned)?;
        writeln!(writer, "{}", json).map_err(NetError::WriteError)?;
        writer.flush().map_err(NetError::WriteError)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Message>, NetError> {
        let rx = self.rx.lock().map_err(|_| NetError::LockPoisoned)?;

        recv_or_disconnect(&rx, timeout, &self.connected)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn recv_or_disconnect(
    rx: &Receiver<Message>,
    timeout: Duration,
    connected: &AtomicBool,
) -> Result<Option<Message>, NetError> {
    match rx.recv_timeout(timeout) {
        Ok(m) => Ok(Some(m)),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => {
            connected.store(false, Ordering::Relaxed);
            Err(NetError::Disconnected)
        }
    }
}

/// Parse one input line into a message.
///
/// Lines starting with `{` are treated as JSON messages, anything else is a bare command token.
fn parse_line(line: &str) -> Option<Message> {
    let line = line.trim();

    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        match Message::from_json(line) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Discarding malformed console message: {}", e);
                None
            }
        }
    } else {
        Some(Message::cmd(line))
    }
}

/// Background thread, forwards parsed input lines to the channel until the input ends.
fn reader_thread<R: BufRead>(reader: R, tx: Sender<Message>, connected: Arc<AtomicBool>) {
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Error reading console input: {}", e);
                break;
            }
        };

        if let Some(msg) = parse_line(&line) {
            if tx.send(msg).is_err() {
                break;
            }
        }
    }

    debug!("Console input closed");
    connected.store(false, Ordering::Relaxed);
}
