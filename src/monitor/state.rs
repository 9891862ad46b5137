//! Connection state, user commands and updates emitted by the monitor.

use std::fmt;

use tokio::sync::mpsc;

use crate::events::{LogEvent, ParseError};
use crate::session::Session;

/// Connectivity of the monitor to a session, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected { session_id: String },
    /// Recoverable: the user may retry.
    Error(String),
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Connected { session_id } => write!(f, "connected to {session_id}"),
            Self::Error(message) => write!(f, "error: {message}"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Commands accepted from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    Switch,
    Ignore,
    Retry,
    Quit,
}

impl MonitorCommand {
    /// Parse one line of interactive input.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "s" | "switch" | "y" | "yes" => Some(Self::Switch),
            "i" | "ignore" | "n" | "no" => Some(Self::Ignore),
            "r" | "retry" => Some(Self::Retry),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Everything the presentation layer needs to render.
#[derive(Debug)]
pub enum MonitorUpdate {
    State(ConnectionState),
    Event(LogEvent),
    ParseError(ParseError),
    /// A newer session appeared while attached to another.
    SwitchPrompt(Session),
    SwitchIgnored(Session),
    /// The buffer was emptied because the attached session changed.
    Cleared,
}

pub type UpdateSender = mpsc::UnboundedSender<MonitorUpdate>;
pub type UpdateReceiver = mpsc::UnboundedReceiver<MonitorUpdate>;
pub type CommandSender = mpsc::UnboundedSender<MonitorCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<MonitorCommand>;
