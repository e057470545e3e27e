//! Pipeline metrics
//!
//! Thin helpers over the `metrics` facade so every crate records the same
//! series names and labels. Without an installed recorder they are no-ops.

use metrics::{counter, histogram};

/// Record one poll of the change log
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_poll;
///
/// let batch = store.fetch_undelivered(limit).await?;
/// record_poll(batch.len());
/// ```
pub fn record_poll(batch_size: usize) {
    counter!("tablecast_events_polled_total").increment(batch_size as u64);
    histogram!("tablecast_poll_batch_size").record(batch_size as f64);
}

/// Record one event flipped to delivered
pub fn record_event_delivered() {
    counter!("tablecast_events_delivered_total").increment(1);
}

/// Record one event with no matching channel
pub fn record_event_unrouted(table: &str) {
    counter!(
        "tablecast_events_unrouted_total",
        "table" => table.to_string()
    )
    .increment(1);
}

/// Record the outcome of one channel delivery
pub fn record_channel_delivery(channel: &str, sink: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "tablecast_channel_deliveries_total",
        "channel" => channel.to_string(),
        "sink" => sink.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the wall time of one complete fan-out
pub fn record_fanout_duration_ms(duration_ms: f64) {
    histogram!("tablecast_fanout_duration_ms").record(duration_ms);
}

/// Record one dead letter handed to the dead-letter sink
pub fn record_dead_letter(sink: &str) {
    counter!(
        "tablecast_dead_letters_total",
        "sink" => sink.to_string()
    )
    .increment(1);
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
