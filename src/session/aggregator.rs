//! Fan-in of one session's hook and telemetry sources.

use tokio::sync::mpsc;

use crate::events::{LineParser, LogEvent, ParseError, SourceKind};
use crate::watcher::{FsSignal, SignalSender, TailReader};

use super::registry::Session;

/// One item produced by an attached session.
#[derive(Debug)]
pub enum StreamItem {
    Event { source: SourceKind, event: LogEvent },
    ParseError(ParseError),
}

pub type StreamSender = mpsc::UnboundedSender<StreamItem>;
pub type StreamReceiver = mpsc::UnboundedReceiver<StreamItem>;

struct SourceTail {
    parser: LineParser,
    reader: TailReader,
}

/// Tails every source of a single session and forwards normalized events.
///
/// Each source is opened independently: a missing or unwatchable
/// telemetry file never prevents the hook log from streaming. Change
/// notifications carry the attachment generation so signals from a
/// previous attachment are ignored after a switch.
pub struct SessionAggregator {
    session: Session,
    generation: u64,
    tails: Vec<SourceTail>,
    sink: StreamSender,
}

impl std::fmt::Debug for SessionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAggregator")
            .field("session", &self.session.id)
            .field("generation", &self.generation)
            .field("sources", &self.open_sources())
            .finish_non_exhaustive()
    }
}

impl SessionAggregator {
    /// Attach to `session`, replaying existing lines of each source into `sink`.
    pub fn open(
        session: Session,
        sources: &[SourceKind],
        generation: u64,
        signals: &SignalSender,
        sink: StreamSender,
    ) -> Self {
        let mut aggregator = Self {
            session,
            generation,
            tails: Vec::with_capacity(sources.len()),
            sink,
        };

        for &source in sources {
            let path = aggregator.session.source_path(source).to_path_buf();
            let parser = LineParser::new(source, aggregator.session.id.clone());
            let mut reader = TailReader::new();
            let tx = signals.clone();
            let opened = reader.open(&path, move || {
                let _ = tx.send(FsSignal::SourceChanged { generation, source });
            });

            match opened {
                Ok(lines) => {
                    let tail = SourceTail { parser, reader };
                    aggregator.forward(&tail.parser, &lines);
                    aggregator.tails.push(tail);
                }
                Err(err) => {
                    tracing::warn!(
                        session_id = %aggregator.session.id,
                        source = %source,
                        path = %path.display(),
                        error = %err,
                        "Source unavailable"
                    );
                }
            }
        }

        tracing::info!(
            session_id = %aggregator.session.id,
            generation,
            sources = aggregator.tails.len(),
            "Attached to session"
        );
        aggregator
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn open_sources(&self) -> Vec<SourceKind> {
        self.tails
            .iter()
            .filter(|t| t.reader.is_open())
            .map(|t| t.parser.source())
            .collect()
    }

    /// Read new lines from `source` after a change notification.
    ///
    /// Returns the number of items forwarded. Stale generations and
    /// sources this aggregator does not tail forward nothing.
    pub fn on_change(&mut self, generation: u64, source: SourceKind) -> usize {
        if generation != self.generation {
            tracing::trace!(
                generation,
                current = self.generation,
                "Ignoring stale change signal"
            );
            return 0;
        }
        let Some(index) = self.tails.iter().position(|t| t.parser.source() == source) else {
            return 0;
        };
        let lines = self.tails[index].reader.poll();
        let tail = &self.tails[index];
        self.forward(&tail.parser, &lines)
    }

    /// Poll every source regardless of notifications.
    pub fn poll_all(&mut self) -> usize {
        let mut forwarded = 0;
        for index in 0..self.tails.len() {
            let lines = self.tails[index].reader.poll();
            forwarded += self.forward(&self.tails[index].parser, &lines);
        }
        forwarded
    }

    fn forward(&self, parser: &LineParser, lines: &[String]) -> usize {
        let mut forwarded = 0;
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match parser.parse(line) {
                Ok(events) => {
                    for event in events {
                        forwarded += self.send(StreamItem::Event {
                            source: parser.source(),
                            event,
                        });
                    }
                }
                Err(err) => {
                    tracing::debug!(source = %parser.source(), error = %err, "Skipping malformed line");
                    forwarded += self.send(StreamItem::ParseError(err));
                }
            }
        }
        forwarded
    }

    fn send(&self, item: StreamItem) -> usize {
        usize::from(self.sink.send(item).is_ok())
    }

    /// Stop every reader. Further change signals are no-ops.
    pub fn close(&mut self) {
        for tail in &mut self.tails {
            tail.reader.close();
        }
        tracing::debug!(session_id = %self.session.id, generation = self.generation, "Detached from session");
    }
}

impl Drop for SessionAggregator {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LogLayout;
    use crate::watcher::signal_channel;
    use std::io::Write;
    use tempfile::TempDir;

    fn session_in(layout: &LogLayout, id: &str) -> Session {
        Session {
            id: id.to_string(),
            hook_log: layout.hook_log(id),
            telemetry_logs: layout.telemetry_logs(id),
            telemetry_metrics: layout.telemetry_metrics(id),
            metadata: None,
            alive: true,
        }
    }

    fn append(path: &std::path::Path, data: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(data.as_bytes()).unwrap();
    }

    fn drain(rx: &mut StreamReceiver) -> Vec<StreamItem> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_replay_and_incremental_reads() {
        let dir = TempDir::new().unwrap();
        let layout = LogLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        let session = session_in(&layout, "s1");
        append(
            &session.hook_log,
            "{\"hookEventName\":\"Stop\",\"timestamp\":1}\nnot json\n",
        );

        let (signals, _signal_rx) = signal_channel();
        let (sink, mut rx) = mpsc::unbounded_channel();
        let mut aggregator =
            SessionAggregator::open(session.clone(), &[SourceKind::Hooks], 1, &signals, sink);
        if aggregator.open_sources().is_empty() {
            // No inotify available in this environment
            return;
        }

        let items = drain(&mut rx);
        assert_eq!(items.len(), 2);
        match &items[0] {
            StreamItem::Event { source, event } => {
                assert_eq!(*source, SourceKind::Hooks);
                assert_eq!(event.session_id, "s1");
            }
            StreamItem::ParseError(e) => panic!("unexpected parse error: {e}"),
        }
        assert!(matches!(items[1], StreamItem::ParseError(_)));

        append(
            &session.hook_log,
            "{\"hookEventName\":\"Notification\",\"message\":\"hi\"}\n",
        );
        assert_eq!(aggregator.on_change(1, SourceKind::Hooks), 1);
        assert_eq!(drain(&mut rx).len(), 1);

        // Stale generation reads nothing
        append(&session.hook_log, "{\"hookEventName\":\"Stop\"}\n");
        assert_eq!(aggregator.on_change(0, SourceKind::Hooks), 0);
        assert_eq!(aggregator.poll_all(), 1);
    }

    #[test]
    fn test_record_split_across_appends_yields_two_events() {
        let dir = TempDir::new().unwrap();
        let layout = LogLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        let session = session_in(&layout, "split");
        append(&session.hook_log, "");

        let (signals, _signal_rx) = signal_channel();
        let (sink, mut rx) = mpsc::unbounded_channel();
        let mut aggregator =
            SessionAggregator::open(session.clone(), &[SourceKind::Hooks], 1, &signals, sink);
        if aggregator.open_sources().is_empty() {
            return;
        }

        append(
            &session.hook_log,
            "{\"hookEventName\":\"Stop\",\"timestamp\":1}\n{\"hookEventName\":\"Stop\",\"timestamp\":2",
        );
        assert_eq!(aggregator.on_change(1, SourceKind::Hooks), 1);
        append(&session.hook_log, "}\n");
        assert_eq!(aggregator.on_change(1, SourceKind::Hooks), 1);
        assert_eq!(aggregator.on_change(1, SourceKind::Hooks), 0);

        let timestamps: Vec<i64> = drain(&mut rx)
            .into_iter()
            .map(|item| match item {
                StreamItem::Event { event, .. } => event.timestamp,
                StreamItem::ParseError(e) => panic!("unexpected parse error: {e}"),
            })
            .collect();
        assert_eq!(timestamps, vec![1, 2]);
    }

    #[test]
    fn test_missing_telemetry_dir_does_not_block_hooks() {
        let dir = TempDir::new().unwrap();
        let layout = LogLayout::new(dir.path());
        std::fs::create_dir_all(layout.hooks_dir()).unwrap();
        let session = session_in(&layout, "s2");
        append(&session.hook_log, "{\"hookEventName\":\"Stop\"}\n");

        let (signals, _signal_rx) = signal_channel();
        let (sink, mut rx) = mpsc::unbounded_channel();
        let aggregator =
            SessionAggregator::open(session, &SourceKind::ALL, 3, &signals, sink);
        if aggregator.open_sources().is_empty() {
            return;
        }

        assert_eq!(aggregator.open_sources(), vec![SourceKind::Hooks]);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_close_stops_reading() {
        let dir = TempDir::new().unwrap();
        let layout = LogLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        let session = session_in(&layout, "s3");

        let (signals, _signal_rx) = signal_channel();
        let (sink, mut rx) = mpsc::unbounded_channel();
        let mut aggregator =
            SessionAggregator::open(session.clone(), &[SourceKind::Hooks], 1, &signals, sink);
        aggregator.close();

        append(&session.hook_log, "{\"hookEventName\":\"Stop\"}\n");
        assert_eq!(aggregator.on_change(1, SourceKind::Hooks), 0);
        assert!(drain(&mut rx).is_empty());
        assert!(aggregator.open_sources().is_empty());
    }
}
