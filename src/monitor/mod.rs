//! Live monitor: session attachment, switching and event streaming.

mod buffer;
mod event_loop;
mod state;

pub use buffer::EventBuffer;
pub use event_loop::Monitor;
pub use state::{
    CommandReceiver, CommandSender, ConnectionState, MonitorCommand, MonitorUpdate,
    UpdateReceiver, UpdateSender,
};
