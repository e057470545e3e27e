//! Pipeline statistics.

use std::time::Duration;

use capture::ListenerStats;
use dispatcher::{MetricsSnapshot, ProcessorStatsSnapshot};

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Number of sinks started
    pub active_sinks: usize,

    /// Poll and delivery counters
    pub listener: ListenerStats,

    /// Fan-out counters
    pub processor: ProcessorStatsSnapshot,

    /// Per-sink worker metrics, sorted by name
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl PipelineStats {
    /// Delivered events per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.listener.events_delivered as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Failed channel attempts as a percentage of all attempts
    pub fn channel_failure_rate(&self) -> f64 {
        let total = self.processor.channel_successes + self.processor.channel_failures;
        if total > 0 {
            (self.processor.channel_failures as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\nPipeline statistics\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Polls: {}", self.listener.polls);
        println!("   ├─ Events fetched: {}", self.listener.events_fetched);
        println!("   ├─ Events delivered: {}", self.listener.events_delivered);
        println!("   ├─ Events without channels: {}", self.listener.events_unrouted);
        println!("   ├─ Throughput: {:.2} events/s", self.events_per_sec());
        println!("   └─ Active sinks: {}", self.active_sinks);

        println!("\nFan-out");
        println!("   ├─ Routed events: {}", self.processor.events);
        println!(
            "   ├─ Channel deliveries: {} ok, {} failed ({:.2}%)",
            self.processor.channel_successes,
            self.processor.channel_failures,
            self.channel_failure_rate()
        );
        println!(
            "   ├─ Dead letters: {} written, {} failed",
            self.processor.dead_letters, self.processor.dead_letter_failures
        );
        println!("   └─ Fan-out latency (ms): {}", self.processor.fanout_ms);

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (i, (name, metrics)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} published, {} failed, queue {}",
                    prefix, name, metrics.publish_count, metrics.failure_count, metrics.queue_len
                );
            }
        }

        println!();
    }
}
