pub mod board;
pub mod log;
#[cfg(feature = "networking")]
pub mod push;

use crate::aggregate::CommandGroup;
use crate::collectors::cpu::CpuRateSnapshot;
use std::collections::BTreeMap;

pub type Labels = BTreeMap<String, String>;

pub const PROCESS_CPU_GAUGE: &str = "process.cpu.usage";
pub const PROCESS_MEMORY_GAUGE: &str = "process.memory.usage";
pub const COMMAND_LABEL: &str = "command";

/// Receives named gauge observations. `flush` marks the end of a tick.
pub trait MetricsSink: Send {
    fn record_gauge(&mut self, name: &str, value: f64, labels: &Labels);
    /// Every series carrying exactly `labels` has ended and will not be recorded again
    /// unless the command comes back.
    fn retire_series(&mut self, _labels: &Labels) {}
    fn flush(&mut self) {}
}

fn command_labels(command: &str) -> Labels {
    Labels::from([(COMMAND_LABEL.to_string(), command.to_string())])
}

pub fn cpu_gauge_name(category: &str) -> String {
    format!("node.cpu.{category}")
}

pub fn record_cpu(sink: &mut dyn MetricsSink, cpu: &CpuRateSnapshot) {
    let none = Labels::new();
    for (category, value) in cpu.categories() {
        sink.record_gauge(&cpu_gauge_name(category), value, &none);
    }
}

pub fn record_groups(sink: &mut dyn MetricsSink, groups: &[CommandGroup]) {
    for g in groups {
        let labels = command_labels(&g.command);
        sink.record_gauge(PROCESS_CPU_GAUGE, g.cpu_percent, &labels);
        sink.record_gauge(PROCESS_MEMORY_GAUGE, g.memory_percent, &labels);
    }
}

pub fn retire_commands<'a>(
    sink: &mut dyn MetricsSink,
    commands: impl IntoIterator<Item = &'a str>,
) {
    for command in commands {
        sink.retire_series(&command_labels(command));
    }
}

/// Forwards every observation to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl MetricsSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for FanoutSink {
    fn record_gauge(&mut self, name: &str, value: f64, labels: &Labels) {
        for s in &mut self.sinks {
            s.record_gauge(name, value, labels);
        }
    }

    fn retire_series(&mut self, labels: &Labels) {
        for s in &mut self.sinks {
            s.retire_series(labels);
        }
    }

    fn flush(&mut self) {
        for s in &mut self.sinks {
            s.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::board::GaugeBoard;
    use super::*;

    #[test]
    fn fanout_reaches_every_sink() {
        let a = GaugeBoard::new();
        let b = GaugeBoard::new();
        let mut fan = FanoutSink::new().with(a.clone()).with(b.clone());
        record_groups(
            &mut fan,
            &[CommandGroup {
                command: "nginx".into(),
                cpu_percent: 12.5,
                memory_percent: 1.0,
            }],
        );
        let labels = Labels::from([(COMMAND_LABEL.to_string(), "nginx".to_string())]);
        for board in [a, b] {
            assert_eq!(board.get(PROCESS_CPU_GAUGE, &labels), Some(12.5));
            assert_eq!(board.get(PROCESS_MEMORY_GAUGE, &labels), Some(1.0));
        }
    }

    #[test]
    fn cpu_gauges_cover_all_categories() {
        let board = GaugeBoard::new();
        let mut sink = board.clone();
        record_cpu(
            &mut sink,
            &CpuRateSnapshot {
                idle: 100.0,
                ..Default::default()
            },
        );
        assert_eq!(board.len(), 10);
        assert_eq!(board.get("node.cpu.idle", &Labels::new()), Some(100.0));
        assert_eq!(board.get("node.cpu.guest_nice", &Labels::new()), Some(0.0));
    }

    #[test]
    fn retiring_a_command_reaches_every_sink() {
        let a = GaugeBoard::new();
        let b = GaugeBoard::new();
        let mut fan = FanoutSink::new().with(a.clone()).with(b.clone());
        let groups = ["cron", "sshd"].map(|c| CommandGroup {
            command: c.into(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
        });
        record_groups(&mut fan, &groups);
        retire_commands(&mut fan, ["cron"]);
        for board in [a, b] {
            assert_eq!(board.len(), 2);
            assert_eq!(board.get(PROCESS_CPU_GAUGE, &command_labels("cron")), None);
            assert_eq!(board.get(PROCESS_CPU_GAUGE, &command_labels("sshd")), Some(0.0));
        }
    }
}
