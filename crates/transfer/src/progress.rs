use std::sync::Mutex;

/// Receives upload progress as a whole percentage (0..=100).
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn report(&self, percent: u8) {
        self(percent)
    }
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8) {}
}

/// `round(completed / total * 100)`, with an empty total counting as done.
pub fn percent_complete(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total);
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Forwards progress to a sink, keeping it non-decreasing and dropping
/// repeats. One reporter spans every attempt of an upload.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<Option<u8>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: Mutex::new(None),
        }
    }

    /// Reports `percent` unless it would move backwards or repeat.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.is_some_and(|prev| percent <= prev) {
            return;
        }
        *last = Some(percent);
        self.sink.report(percent);
    }

    /// Reports the fraction of parts done.
    pub fn report_parts(&self, completed: u64, total: u64) {
        self.report(percent_complete(completed, total));
    }
}
