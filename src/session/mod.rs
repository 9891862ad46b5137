//! Session discovery, selection and attachment.
//!
//! The [`SessionRegistry`] finds sessions on disk, the
//! [`SessionController`] decides which one is attached, and a
//! [`SessionAggregator`] streams the attached session's sources.

mod aggregator;
mod controller;
mod error;
mod layout;
mod liveness;
mod registry;

pub use aggregator::{SessionAggregator, StreamItem, StreamReceiver, StreamSender};
pub use controller::{ControllerAction, SessionController, SwitchState};
pub use error::SessionError;
pub use layout::LogLayout;
pub use liveness::{LivenessProbe, ProcessProbe};
pub use registry::{Session, SessionRegistry};
