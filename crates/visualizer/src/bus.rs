use std::fmt;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

/// Messages kept before the oldest undrained one is discarded.
pub const BUS_CAPACITY: usize = 256;

/// Error categories used when posting to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    ResourceNotFound,
    ResourceBusy,
    LibraryInit,
    CoreNegotiation,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorDomain::ResourceNotFound => "resource/not-found",
            ErrorDomain::ResourceBusy => "resource/busy",
            ErrorDomain::LibraryInit => "library/init",
            ErrorDomain::CoreNegotiation => "core/negotiation",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementMessage {
    Error {
        source: String,
        domain: ErrorDomain,
        message: String,
        debug: Option<String>,
    },
    Warning {
        source: String,
        message: String,
    },
}

impl ElementMessage {
    pub fn is_error(&self) -> bool {
        matches!(self, ElementMessage::Error { .. })
    }
}

/// Channel elements post errors and warnings to; the application drains it.
///
/// Holds at most [`BUS_CAPACITY`] messages. Posting to a full bus drops the
/// oldest message.
#[derive(Debug, Clone)]
pub struct Bus {
    sender: Sender<ElementMessage>,
    receiver: Receiver<ElementMessage>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self::with_capacity(BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    pub fn post(&self, message: ElementMessage) {
        let mut message = message;
        loop {
            match self.sender.try_send(message) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(dropped) = self.receiver.try_recv() {
                        warn!(?dropped, "bus is full, dropping oldest message");
                    }
                    message = rejected;
                }
                // The bus owns a receiver, so it never disconnects.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn pop(&self) -> Option<ElementMessage> {
        self.receiver.try_recv().ok()
    }

    pub fn drain(&self) -> Vec<ElementMessage> {
        self.receiver.try_iter().collect()
    }
}
