use std::time::{Duration, Instant};

use tracing::info;

/// Wall-clock span of one job or `sync` step, logged as a `task` field.
pub struct Timer {
    task: String,
    start: Instant,
}

impl Timer {
    pub fn start(task: impl Into<String>) -> Self {
        let task = task.into();
        info!(task = %task, "started");
        Self {
            task,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(task = %self.task, took = %fmt_duration(self.elapsed()), "finished");
    }
}

/// Row and unit counts with thousands separators.
pub fn fmt_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Seconds with one decimal, as shown for jobs and steps.
pub fn fmt_duration(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}
