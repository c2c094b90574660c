//! Console output sinks.
//!
//! Demo tasks print whole lines; where they go is up to the host.

use std::sync::Arc;

use parking_lot::Mutex;

/// Line-oriented output.
pub trait Console: Send + Sync {
    fn print(&self, line: &str);
}

/// Forwards every line to the `log` facade at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConsole;

impl Console for LogConsole {
    fn print(&self, line: &str) {
        log::info!(target: "console", "{line}");
    }
}

/// Records lines in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Number of lines equal to `line`.
    pub fn count(&self, line: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.as_str() == line).count()
    }

    /// Index of the first line equal to `line`.
    pub fn position(&self, line: &str) -> Option<usize> {
        self.lines.lock().iter().position(|l| l == line)
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Console for Transcript {
    fn print(&self, line: &str) {
        self.lines.lock().push(line.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_clones_share_lines() {
        let transcript = Transcript::new();
        let sink: Arc<dyn Console> = Arc::new(transcript.clone());

        sink.print("one");
        sink.print("two");
        sink.print("one");

        assert_eq!(transcript.lines(), ["one", "two", "one"]);
        assert_eq!(transcript.count("one"), 2);
        assert_eq!(transcript.position("two"), Some(1));
        assert_eq!(transcript.position("three"), None);

        transcript.clear();
        assert!(transcript.is_empty());
    }
}
