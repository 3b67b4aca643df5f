//! Host resource metrics reported by the status tool

use std::time::Duration;

use sysinfo::System;

/// A point-in-time resource reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemStats {
    /// Global CPU usage, 0-100
    pub cpu_percent: f32,
    /// Used memory, 0-100
    pub memory_percent: f32,
    /// Host uptime
    pub uptime: Duration,
}

impl SystemStats {
    /// Spoken summary of the reading
    #[must_use]
    pub fn summary(&self) -> String {
        let hours = self.uptime.as_secs() / 3600;
        let minutes = (self.uptime.as_secs() % 3600) / 60;
        format!(
            "CPU is at {:.0} percent, memory is at {:.0} percent. Uptime is {hours} hours {minutes} minutes.",
            self.cpu_percent, self.memory_percent
        )
    }
}

/// Source of resource readings
pub trait MetricsSource: Send {
    /// Take a fresh reading
    fn sample(&mut self) -> SystemStats;
}

/// Metrics from the local host via `sysinfo`
pub struct SysinfoMetrics {
    system: System,
}

impl SysinfoMetrics {
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        // First CPU reading is a baseline; usage is measured against it
        system.refresh_cpu();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SysinfoMetrics {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn sample(&mut self) -> SystemStats {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (self.system.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        let stats = SystemStats {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            memory_percent,
            uptime: Duration::from_secs(System::uptime()),
        };

        tracing::debug!(
            cpu = stats.cpu_percent,
            memory = stats.memory_percent,
            "sampled system metrics"
        );
        stats
    }
}
