use std::sync::{Arc, Mutex};

mod interrupt;
mod timer;

/// Shared event log written from task bodies, callbacks and handlers.
#[derive(Clone, Default)]
struct Trace {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Trace {
    fn push(&self, line: impl Into<String>) {
        self.lines.lock().unwrap().push(line.into());
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}
