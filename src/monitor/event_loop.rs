//! The monitor's owner loop.
//!
//! All session state lives on this one task. Filesystem callbacks,
//! user commands and cancellation arrive as messages and are applied
//! one at a time, so no state is shared with watcher threads.

use notify::RecommendedWatcher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::events::SourceKind;
use crate::session::{
    ControllerAction, Session, SessionAggregator, SessionController, SessionRegistry,
    StreamItem, StreamReceiver, StreamSender,
};
use crate::watcher::{signal_channel, FsSignal, SignalReceiver, SignalSender};

use super::buffer::EventBuffer;
use super::state::{CommandReceiver, ConnectionState, MonitorCommand, MonitorUpdate, UpdateSender};

/// Attaches to a session and streams its events as [`MonitorUpdate`]s.
pub struct Monitor {
    sources: Vec<SourceKind>,
    registry: SessionRegistry,
    controller: SessionController,
    aggregator: Option<SessionAggregator>,
    generation: u64,
    buffer: EventBuffer,
    state: ConnectionState,
    requested: Option<String>,
    skip_check: bool,
    signals_tx: SignalSender,
    signals_rx: Option<SignalReceiver>,
    items_tx: StreamSender,
    items_rx: StreamReceiver,
    dir_watcher: Option<RecommendedWatcher>,
    updates: UpdateSender,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("buffered", &self.buffer.len())
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    #[must_use]
    pub fn new(config: &MonitorConfig, registry: SessionRegistry, updates: UpdateSender) -> Self {
        let (signals_tx, signals_rx) = signal_channel();
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        Self {
            sources: config.sources(),
            registry,
            controller: SessionController::new(),
            aggregator: None,
            generation: 0,
            buffer: EventBuffer::new(config.max_buffered_events),
            state: ConnectionState::Disconnected,
            requested: None,
            skip_check: false,
            signals_tx,
            signals_rx: Some(signals_rx),
            items_tx,
            items_rx,
            dir_watcher: None,
            updates,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[must_use]
    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Generation of the current attachment; bumps on every attach.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn open_sources(&self) -> Vec<SourceKind> {
        self.aggregator
            .as_ref()
            .map(SessionAggregator::open_sources)
            .unwrap_or_default()
    }

    /// Prepare the log directories, watch for new sessions and attach.
    ///
    /// With `requested`, attach to that session; otherwise to the most
    /// recently started active one. Failures leave the monitor in
    /// [`ConnectionState::Error`] and still watching.
    pub fn start(&mut self, requested: Option<String>, skip_check: bool) {
        self.requested = requested;
        self.skip_check = skip_check;

        if let Err(err) = self.registry.layout().ensure_dirs() {
            tracing::warn!(
                base_dir = %self.registry.layout().base_dir().display(),
                error = %err,
                "Failed to create log directories"
            );
        }
        match self.registry.watch(self.signals_tx.clone()) {
            Ok(watcher) => self.dir_watcher = Some(watcher),
            Err(err) => tracing::warn!(error = %err, "New sessions will not be detected"),
        }

        self.connect();
    }

    fn connect(&mut self) {
        self.set_state(ConnectionState::Connecting);

        if let Some(id) = self.requested.clone() {
            match self.registry.find(&id, self.skip_check) {
                Ok(session) => {
                    self.controller.attach(session.clone());
                    self.attach(session);
                }
                Err(err) => self.set_state(ConnectionState::Error(err.to_string())),
            }
            return;
        }

        let attached = self.controller.current_id().map(ToOwned::to_owned);
        match self.registry.latest(attached.as_deref()) {
            Some(session) => self.observe(session),
            None => self.set_state(ConnectionState::Error("No active session found".into())),
        }
    }

    fn observe(&mut self, session: Session) {
        match self.controller.observe(session) {
            ControllerAction::Attach(session) => self.attach(session),
            ControllerAction::PromptSwitch(candidate) => {
                tracing::info!(
                    current = ?self.controller.current_id(),
                    candidate = %candidate.id,
                    "Switch available"
                );
                self.emit(MonitorUpdate::SwitchPrompt(candidate));
            }
            ControllerAction::None => {}
        }
    }

    fn attach(&mut self, session: Session) {
        let switching = self.aggregator.take().is_some();
        self.generation += 1;
        self.buffer.clear();
        // Items still queued from the previous attachment belong to it.
        while self.items_rx.try_recv().is_ok() {}
        if switching {
            self.emit(MonitorUpdate::Cleared);
        }

        let session_id = session.id.clone();
        self.set_state(ConnectionState::Connected { session_id });
        self.aggregator = Some(SessionAggregator::open(
            session,
            &self.sources,
            self.generation,
            &self.signals_tx,
            self.items_tx.clone(),
        ));
        self.drain_items();
    }

    /// Apply one filesystem signal.
    pub fn handle_signal(&mut self, signal: FsSignal) {
        match signal {
            FsSignal::SourceChanged { generation, source } => {
                if let Some(aggregator) = self.aggregator.as_mut() {
                    aggregator.on_change(generation, source);
                }
                self.drain_items();
            }
            FsSignal::DirChanged(path) => {
                let discovered = self.registry.on_dir_change(&path);
                if let Some(requested) = self.awaiting_requested() {
                    // Only the named session may satisfy an explicit request.
                    let id = self.registry.layout().session_id_from_path(&path);
                    if id.as_deref() == Some(requested.as_str()) {
                        self.connect();
                    } else if let Some(session) = discovered {
                        tracing::debug!(
                            session_id = %session.id,
                            requested = %requested,
                            "Ignoring session while waiting for requested one"
                        );
                    }
                    return;
                }
                if let Some(session) = discovered {
                    self.observe(session);
                }
            }
        }
    }

    /// The explicitly requested session, while it is not yet attached.
    fn awaiting_requested(&self) -> Option<String> {
        if self.controller.current().is_some() {
            return None;
        }
        self.requested.clone()
    }

    /// Apply one user command. Returns `false` when the monitor should stop.
    pub fn handle_command(&mut self, command: MonitorCommand) -> bool {
        match command {
            MonitorCommand::Switch => match self.controller.switch() {
                Some(session) => {
                    tracing::info!(session_id = %session.id, "Switching session");
                    self.attach(session);
                }
                None => tracing::debug!("No pending switch"),
            },
            MonitorCommand::Ignore => {
                if let Some(candidate) = self.controller.ignore() {
                    tracing::info!(session_id = %candidate.id, "Switch ignored");
                    self.emit(MonitorUpdate::SwitchIgnored(candidate));
                }
            }
            MonitorCommand::Retry => {
                if self.aggregator.is_none() {
                    self.connect();
                } else {
                    tracing::debug!("Already attached, retry ignored");
                }
            }
            MonitorCommand::Quit => return false,
        }
        true
    }

    /// Run until cancelled or told to quit.
    ///
    /// Closing the command channel does not stop the loop; only
    /// [`MonitorCommand::Quit`] or cancellation does.
    pub async fn run(mut self, mut commands: CommandReceiver, cancel: CancellationToken) {
        let Some(mut signals) = self.signals_rx.take() else {
            tracing::error!("Monitor event loop started twice");
            return;
        };

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(signal) = signals.recv() => self.handle_signal(signal),
                Some(command) = commands.recv() => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                else => break,
            }
        }

        self.shutdown();
    }

    /// Stop all watchers and report the monitor as disconnected.
    pub fn shutdown(&mut self) {
        if let Some(mut aggregator) = self.aggregator.take() {
            aggregator.close();
        }
        self.dir_watcher = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn drain_items(&mut self) {
        while let Ok(item) = self.items_rx.try_recv() {
            match item {
                StreamItem::Event { event, .. } => {
                    self.buffer.push(event.clone());
                    self.emit(MonitorUpdate::Event(event));
                }
                StreamItem::ParseError(err) => self.emit(MonitorUpdate::ParseError(err)),
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "Connection state changed");
        self.state = state.clone();
        self.emit(MonitorUpdate::State(state));
    }

    fn emit(&self, update: MonitorUpdate) {
        // A closed renderer only means nobody is watching any more.
        let _ = self.updates.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionMetadata;
    use crate::monitor::UpdateReceiver;
    use crate::session::LogLayout;
    use std::io::Write;
    use tempfile::TempDir;

    const ALIVE: u32 = 10;

    fn write_session(layout: &LogLayout, id: &str, start_time: i64, lines: &str) {
        layout.ensure_dirs().unwrap();
        std::fs::write(layout.hook_log(id), lines).unwrap();
        let meta = SessionMetadata {
            session_id: id.into(),
            pid: ALIVE,
            start_time,
            cwd: String::new(),
            user: String::new(),
        };
        std::fs::write(layout.metadata(id), serde_json::to_string(&meta).unwrap()).unwrap();
    }

    fn monitor(dir: &TempDir) -> (Monitor, UpdateReceiver, LogLayout) {
        let config = MonitorConfig {
            base_dir: dir.path().to_path_buf(),
            telemetry: false,
            ..MonitorConfig::default()
        };
        let registry =
            SessionRegistry::with_probe(config.layout(), |pid: u32| pid == ALIVE);
        let (tx, rx) = mpsc::unbounded_channel();
        (Monitor::new(&config, registry, tx), rx, config.layout())
    }

    fn drain(rx: &mut UpdateReceiver) -> Vec<MonitorUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    #[test]
    fn test_no_session_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, mut rx, layout) = monitor(&dir);

        monitor.start(None, false);
        assert_eq!(
            monitor.state(),
            &ConnectionState::Error("No active session found".into())
        );

        write_session(&layout, "late", 5, "");
        assert!(monitor.handle_command(MonitorCommand::Retry));
        assert_eq!(
            monitor.state(),
            &ConnectionState::Connected {
                session_id: "late".into()
            }
        );
        assert!(drain(&mut rx)
            .iter()
            .any(|u| matches!(u, MonitorUpdate::State(ConnectionState::Error(_)))));
    }

    #[test]
    fn test_attaches_latest_and_replays() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, mut rx, layout) = monitor(&dir);
        write_session(&layout, "old", 1, "{\"hook_event_name\":\"Stop\"}\n");
        write_session(
            &layout,
            "new",
            2,
            "{\"hook_event_name\":\"Stop\"}\n{\"hook_event_name\":\"Stop\"}\n",
        );

        monitor.start(None, false);
        assert_eq!(monitor.controller().current_id(), Some("new"));
        if monitor.open_sources().is_empty() {
            return;
        }
        assert_eq!(monitor.buffer().len(), 2);
        let events = drain(&mut rx)
            .into_iter()
            .filter(|u| matches!(u, MonitorUpdate::Event(_)))
            .count();
        assert_eq!(events, 2);
    }

    #[test]
    fn test_switch_flow() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, mut rx, layout) = monitor(&dir);
        write_session(&layout, "first", 1, "{\"hook_event_name\":\"Stop\"}\n");
        monitor.start(None, false);
        let first_generation = monitor.generation();

        write_session(&layout, "second", 2, "");
        monitor.handle_signal(FsSignal::DirChanged(layout.hook_log("second")));
        assert_eq!(
            monitor.controller().candidate().map(|s| s.id.as_str()),
            Some("second")
        );
        assert!(drain(&mut rx)
            .iter()
            .any(|u| matches!(u, MonitorUpdate::SwitchPrompt(s) if s.id == "second")));

        monitor.handle_command(MonitorCommand::Switch);
        assert_eq!(monitor.controller().current_id(), Some("second"));
        assert!(monitor.generation() > first_generation);
        assert!(monitor.buffer().is_empty());
        assert!(drain(&mut rx)
            .iter()
            .any(|u| matches!(u, MonitorUpdate::Cleared)));

        // Signals tagged with the old generation are ignored
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(layout.hook_log("first"))
            .unwrap();
        file.write_all(b"{\"hook_event_name\":\"Stop\"}\n").unwrap();
        monitor.handle_signal(FsSignal::SourceChanged {
            generation: first_generation,
            source: SourceKind::Hooks,
        });
        assert!(monitor.buffer().is_empty());
    }

    #[test]
    fn test_ignore_keeps_session() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, mut rx, layout) = monitor(&dir);
        write_session(&layout, "first", 1, "");
        monitor.start(None, false);

        write_session(&layout, "second", 2, "");
        monitor.handle_signal(FsSignal::DirChanged(layout.metadata("second")));
        monitor.handle_command(MonitorCommand::Ignore);

        assert_eq!(monitor.controller().current_id(), Some("first"));
        assert!(drain(&mut rx)
            .iter()
            .any(|u| matches!(u, MonitorUpdate::SwitchIgnored(s) if s.id == "second")));
    }

    #[test]
    fn test_requested_session_errors() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, _rx, _layout) = monitor(&dir);
        monitor.start(Some("missing".into()), false);
        assert_eq!(
            monitor.state(),
            &ConnectionState::Error("Session not found: missing".into())
        );
    }

    #[test]
    fn test_requested_session_is_not_replaced() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, _rx, layout) = monitor(&dir);
        monitor.start(Some("wanted".into()), false);

        write_session(&layout, "other", 1, "");
        monitor.handle_signal(FsSignal::DirChanged(layout.hook_log("other")));
        monitor.handle_signal(FsSignal::DirChanged(layout.metadata("other")));
        assert_eq!(monitor.controller().current_id(), None);
        assert_eq!(
            monitor.state(),
            &ConnectionState::Error("Session not found: wanted".into())
        );

        write_session(&layout, "wanted", 2, "");
        monitor.handle_signal(FsSignal::DirChanged(layout.hook_log("wanted")));
        assert_eq!(monitor.controller().current_id(), Some("wanted"));
        assert_eq!(
            monitor.state(),
            &ConnectionState::Connected {
                session_id: "wanted".into()
            }
        );
    }

    #[test]
    fn test_retry_finds_requested_session() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, _rx, layout) = monitor(&dir);
        monitor.start(Some("wanted".into()), false);

        write_session(&layout, "wanted", 1, "");
        assert!(monitor.handle_command(MonitorCommand::Retry));
        assert_eq!(monitor.controller().current_id(), Some("wanted"));
    }

    #[tokio::test]
    async fn test_quit_stops_run() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, _rx, _layout) = monitor(&dir);
        monitor.start(None, false);

        let (tx, commands) = mpsc::unbounded_channel();
        tx.send(MonitorCommand::Quit).unwrap();
        monitor.run(commands, CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn test_cancellation_stops_run() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, mut rx, _layout) = monitor(&dir);
        monitor.start(None, false);

        let (_tx, commands) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        monitor.run(commands, cancel).await;

        let updates = drain(&mut rx);
        assert!(matches!(
            updates.last(),
            Some(MonitorUpdate::State(ConnectionState::Disconnected))
        ));
    }
}
