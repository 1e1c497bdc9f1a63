// Pipeline metrics module
//
// Lock-free counters shared by the task controller, the task worker and the render worker

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for both background pipelines.
///
/// Uses relaxed atomics: values are only read for logging and tests, never to
/// synchronize anything.
#[derive(Debug)]
pub struct Metrics {
    /// Submissions that passed the busy gate and reached the task worker
    pub tasks_accepted: AtomicU64,

    /// Submissions rejected because another task was in flight
    pub tasks_rejected: AtomicU64,

    /// Tasks that finished successfully
    pub tasks_succeeded: AtomicU64,

    /// Tasks that finished with a failure (validation, geometry error or panic)
    pub tasks_failed: AtomicU64,

    /// Operation parameter values dropped after their task ended
    pub params_released: AtomicU64,

    /// Wall time between acceptance and the finished signal, in milliseconds
    pub total_task_time_ms: AtomicU64,

    /// Frames drawn and published by the render worker
    pub frames_rendered: AtomicU64,

    /// Framebuffer reallocations
    pub resizes: AtomicU64,

    /// Upward task events broadcast while nothing was subscribed. Not a loss:
    /// the headless CLI never subscribes.
    pub events_unobserved: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_accepted: AtomicU64::new(0),
            tasks_rejected: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            params_released: AtomicU64::new(0),
            total_task_time_ms: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            resizes: AtomicU64::new(0),
            events_unobserved: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_accepted(&self) {
        self.tasks_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished task and how long it was in flight
    pub fn record_task_finished(&self, success: bool, duration: Duration) {
        if success {
            self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_task_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_params_released(&self) {
        self.params_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resize(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_unobserved(&self) {
        self.events_unobserved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Tasks that have sent their finished signal
    pub fn tasks_finished(&self) -> u64 {
        self.tasks_succeeded.load(Ordering::Relaxed) + self.tasks_failed.load(Ordering::Relaxed)
    }

    /// Average in-flight time per finished task in milliseconds
    pub fn avg_task_time_ms(&self) -> f64 {
        let total = self.total_task_time_ms.load(Ordering::Relaxed);
        let count = self.tasks_finished();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Average frames per second since startup
    pub fn avg_fps(&self) -> f64 {
        let secs = self.uptime().as_secs_f64();
        if secs > 0.0 {
            self.frames_rendered.load(Ordering::Relaxed) as f64 / secs
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Pipeline Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} accepted, {} rejected, {} succeeded, {} failed (avg: {:.2}ms)",
            self.tasks_accepted.load(Ordering::Relaxed),
            self.tasks_rejected.load(Ordering::Relaxed),
            self.tasks_succeeded.load(Ordering::Relaxed),
            self.tasks_failed.load(Ordering::Relaxed),
            self.avg_task_time_ms()
        );
        tracing::info!(
            "Parameters released: {}, events without subscribers: {}",
            self.params_released.load(Ordering::Relaxed),
            self.events_unobserved.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Frames: {} ({:.1} fps avg), resizes: {}",
            self.frames_rendered.load(Ordering::Relaxed),
            self.avg_fps(),
            self.resizes.load(Ordering::Relaxed)
        );
    }

    /// Short progress line for long render sessions
    pub fn log_periodic(&self) {
        tracing::debug!(
            "Metrics: {} frames, {} tasks finished, uptime {:.0}s",
            self.frames_rendered.load(Ordering::Relaxed),
            self.tasks_finished(),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
