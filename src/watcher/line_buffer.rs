//! Reassembles newline-terminated lines from arbitrary byte chunks.

/// Holds the unterminated tail of the last chunk until its newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes.
    ///
    /// Blank lines are skipped and a trailing `\r` is stripped. Splitting
    /// happens on bytes, so a multi-byte character cut between two chunks
    /// is decoded intact once the line is complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|b| *b == b'\n')
            .filter_map(|raw| {
                let text = String::from_utf8_lossy(raw);
                let text = text.trim_end_matches('\r');
                if text.trim().is_empty() {
                    None
                } else {
                    Some(text.to_string())
                }
            })
            .collect()
    }

    /// Number of buffered bytes still waiting for a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
