//! Claude Watch - live monitor for Claude Code hook and telemetry logs.

pub mod config;
pub mod display;
pub mod events;
pub mod hooks;
pub mod monitor;
pub mod session;
pub mod watcher;
