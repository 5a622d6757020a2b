/// Events emitted while an indexing pass runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    PassStarted {
        candidates: usize,
    },
    ManifestStarted {
        path: String,
    },
    ManifestFinished {
        path: String,
        files_stored: u64,
        success: bool,
    },
}

pub trait IndexProgress: Send + Sync {
    fn report(&self, event: IndexEvent);
}

/// Reporter that drops every event.
pub struct NoopProgress;

impl IndexProgress for NoopProgress {
    fn report(&self, _event: IndexEvent) {}
}
