use super::{Labels, MetricsSink};
use tracing::{debug, info};

/// Writes each gauge as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct LogSink {
    recorded: usize,
}

impl MetricsSink for LogSink {
    fn record_gauge(&mut self, name: &str, value: f64, labels: &Labels) {
        self.recorded += 1;
        match labels.get(super::COMMAND_LABEL) {
            Some(command) => debug!(gauge = name, value, command = %command, "gauge"),
            None => debug!(gauge = name, value, "gauge"),
        }
    }

    fn retire_series(&mut self, labels: &Labels) {
        if let Some(command) = labels.get(super::COMMAND_LABEL) {
            debug!(command = %command, "series retired");
        }
    }

    fn flush(&mut self) {
        info!(gauges = self.recorded, "tick recorded");
        self.recorded = 0;
    }
}
