/// One trace record produced by the machine.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LogEntry {
    /// Register transfer performed during a clock pulse, e.g. `AR <- PC`
    Step(String),
    /// Marks which cycle the following steps belong to, and at which time pulse
    Context { title: &'static str, time: u8 },
    Info(String),
    Warning(String),
    Error(String),
}

/// Append-only execution trace. Owned by whoever drives the machine.
#[derive(Clone, Default, Debug)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn step(&mut self, step: impl Into<String>) {
        self.push(LogEntry::Step(step.into()));
    }

    pub fn context(&mut self, title: &'static str, time: u8) {
        self.push(LogEntry::Context { title, time });
    }

    pub fn info(&mut self, info: impl Into<String>) {
        self.push(LogEntry::Info(info.into()));
    }

    pub fn warning(&mut self, warning: impl Into<String>) {
        self.push(LogEntry::Warning(warning.into()));
    }

    pub fn error(&mut self, error: impl Into<String>) {
        self.push(LogEntry::Error(error.into()));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Hand over everything recorded so far, leaving the log empty.
    pub fn take(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_and_drains() {
        let mut log = Log::new();
        log.context("FETCH", 0);
        log.step("AR <- PC");
        log.warning("careful");
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.entries()[0],
            LogEntry::Context {
                title: "FETCH",
                time: 0
            }
        );

        let taken = log.take();
        assert_eq!(taken[1], LogEntry::Step("AR <- PC".into()));
        assert!(log.is_empty());
        log.info("again");
        assert_eq!(log.entries(), &[LogEntry::Info("again".into())]);
    }
}
