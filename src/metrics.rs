// Performance metrics module
//
// Lightweight counters for the call bridge and prompts

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session-wide counters.
///
/// Uses atomic operations for thread-safe tracking without locks. One
/// instance is shared by the dispatcher, the UI context and every prompt of a
/// session; it is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Calls queued to the UI loop through `run_on_ui_context`
    dispatched_calls: AtomicU64,

    /// Calls that ran inline because they came from the UI thread
    inline_calls: AtomicU64,

    /// Fire-and-forget jobs queued through `post`
    posted_jobs: AtomicU64,

    /// Calls rejected because the loop was not running
    unavailable: AtomicU64,

    /// Dispatched or posted work that panicked
    work_panics: AtomicU64,

    /// Native toolkit events processed by the loop
    native_events: AtomicU64,

    prompts_added: AtomicU64,
    prompts_removed: AtomicU64,

    submits_accepted: AtomicU64,
    submits_ignored: AtomicU64,
    submits_replaced: AtomicU64,

    /// Sum of presentation-to-response intervals, in microseconds
    total_response_time_us: AtomicU64,

    start_time: Instant,
}

/// Plain copy of the counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub dispatched_calls: u64,
    pub inline_calls: u64,
    pub posted_jobs: u64,
    pub unavailable: u64,
    pub work_panics: u64,
    pub native_events: u64,
    pub prompts_added: u64,
    pub prompts_removed: u64,
    pub submits_accepted: u64,
    pub submits_ignored: u64,
    pub submits_replaced: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            dispatched_calls: AtomicU64::new(0),
            inline_calls: AtomicU64::new(0),
            posted_jobs: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            work_panics: AtomicU64::new(0),
            native_events: AtomicU64::new(0),
            prompts_added: AtomicU64::new(0),
            prompts_removed: AtomicU64::new(0),
            submits_accepted: AtomicU64::new(0),
            submits_ignored: AtomicU64::new(0),
            submits_replaced: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_dispatched_call(&self) {
        self.dispatched_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inline_call(&self) {
        self.inline_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_posted(&self) {
        self.posted_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_work_panic(&self) {
        self.work_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_native_event(&self) {
        self.native_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prompt_added(&self) {
        self.prompts_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prompt_removed(&self) {
        self.prompts_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted submission and its presentation-to-response interval.
    pub fn record_submit_accepted(&self, response_time: Duration) {
        self.submits_accepted.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(response_time.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_submit_ignored(&self) {
        self.submits_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submit_replaced(&self) {
        self.submits_replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average presentation-to-response interval in milliseconds
    pub fn avg_response_time_ms(&self) -> f64 {
        let total = self.total_response_time_us.load(Ordering::Relaxed);
        let count = self.submits_accepted.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64 / 1000.0
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched_calls: self.dispatched_calls.load(Ordering::Relaxed),
            inline_calls: self.inline_calls.load(Ordering::Relaxed),
            posted_jobs: self.posted_jobs.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            work_panics: self.work_panics.load(Ordering::Relaxed),
            native_events: self.native_events.load(Ordering::Relaxed),
            prompts_added: self.prompts_added.load(Ordering::Relaxed),
            prompts_removed: self.prompts_removed.load(Ordering::Relaxed),
            submits_accepted: self.submits_accepted.load(Ordering::Relaxed),
            submits_ignored: self.submits_ignored.load(Ordering::Relaxed),
            submits_replaced: self.submits_replaced.load(Ordering::Relaxed),
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "UI calls: {} dispatched, {} inline, {} posted, {} rejected, {} panicked",
            s.dispatched_calls,
            s.inline_calls,
            s.posted_jobs,
            s.unavailable,
            s.work_panics
        );
        tracing::info!("Native events: {}", s.native_events);
        tracing::info!(
            "Prompts: {} added, {} removed",
            s.prompts_added,
            s.prompts_removed
        );
        tracing::info!(
            "Submits: {} accepted, {} ignored, {} replaced (avg response: {:.2}ms)",
            s.submits_accepted,
            s.submits_ignored,
            s.submits_replaced,
            self.avg_response_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
