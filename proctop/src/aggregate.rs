use crate::collectors::proc::{ProcState, ProcessRate};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashMap};
use tracing::debug;

/// Decides which process rates count towards their command group.
pub trait RateFilter: Send {
    fn admits(&self, rate: &ProcessRate) -> bool;
}

impl<F> RateFilter for F
where
    F: Fn(&ProcessRate) -> bool + Send,
{
    fn admits(&self, rate: &ProcessRate) -> bool {
        self(rate)
    }
}

/// Which process states are treated as live when grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum LiveFilter {
    /// Everything except zombie, dead and stopped processes.
    #[default]
    ExcludeTerminatedAndStopped,
    /// Only processes currently in the run queue.
    OnlyRunning,
}

impl RateFilter for LiveFilter {
    fn admits(&self, rate: &ProcessRate) -> bool {
        match self {
            LiveFilter::ExcludeTerminatedAndStopped => {
                !rate.state.is_terminated() && !rate.state.is_stopped()
            }
            LiveFilter::OnlyRunning => rate.state == ProcState::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandGroup {
    pub command: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl CommandGroup {
    pub fn is_idle(&self) -> bool {
        self.cpu_percent == 0.0 && self.memory_percent == 0.0
    }
}

/// Result of one tick. `retired` holds groups pruned this tick, all at (0, 0).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub ranked: Vec<CommandGroup>,
    pub retired: Vec<CommandGroup>,
}

pub struct AggregationStage {
    groups: HashMap<String, CommandGroup>,
    filter: Box<dyn RateFilter>,
    noise_floor_percent: f64,
    top_n: usize,
}

impl AggregationStage {
    pub fn new(filter: impl RateFilter + 'static, noise_floor_percent: f64, top_n: usize) -> Self {
        Self {
            groups: HashMap::new(),
            filter: Box::new(filter),
            noise_floor_percent,
            top_n,
        }
    }

    pub fn accumulate<'a>(
        &mut self,
        rates: impl IntoIterator<Item = &'a ProcessRate>,
    ) -> Aggregation {
        for g in self.groups.values_mut() {
            g.cpu_percent = 0.0;
            g.memory_percent = 0.0;
        }

        // pid order keeps float sums identical between runs
        let mut rates: Vec<&ProcessRate> = rates.into_iter().collect();
        rates.sort_by_key(|r| r.pid);
        for r in rates {
            if !self.filter.admits(r) || r.cpu_percent < self.noise_floor_percent {
                continue;
            }
            let g = self
                .groups
                .entry(r.command.clone())
                .or_insert_with(|| CommandGroup {
                    command: r.command.clone(),
                    cpu_percent: 0.0,
                    memory_percent: 0.0,
                });
            g.cpu_percent += r.cpu_percent;
            g.memory_percent += r.memory_percent;
        }

        let mut ranked: Vec<CommandGroup> = self.groups.values().cloned().collect();
        ranked.sort_by(rank_order);
        if self.top_n > 0 {
            ranked.truncate(self.top_n);
        }

        let mut retired: Vec<CommandGroup> = Vec::new();
        self.groups.retain(|_, g| {
            if g.is_idle() {
                retired.push(g.clone());
                false
            } else {
                true
            }
        });
        retired.sort_by(|a, b| a.command.cmp(&b.command));
        if !retired.is_empty() {
            debug!(count = retired.len(), "retired command groups");
        }

        Aggregation { ranked, retired }
    }

    /// Zeroes and removes every tracked group, for the final observation on shutdown.
    pub fn retire_all(&mut self) -> Vec<CommandGroup> {
        let mut out: Vec<CommandGroup> = self
            .groups
            .drain()
            .map(|(command, _)| CommandGroup {
                command,
                cpu_percent: 0.0,
                memory_percent: 0.0,
            })
            .collect();
        out.sort_by(|a, b| a.command.cmp(&b.command));
        out
    }

    pub fn tracked(&self) -> usize {
        self.groups.len()
    }
}

fn rank_order(a: &CommandGroup, b: &CommandGroup) -> Ordering {
    b.cpu_percent
        .total_cmp(&a.cpu_percent)
        .then_with(|| a.command.cmp(&b.command))
}
