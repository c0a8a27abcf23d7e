use crate::error::{SampleError, SampleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

/// Scheduler state as reported in the third field of `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcState {
    Running,
    Sleeping,
    DiskSleep,
    Zombie,
    Stopped,
    TracingStop,
    Dead,
    Idle,
    Other(char),
}

impl ProcState {
    pub fn from_code(c: char) -> Self {
        match c {
            'R' => ProcState::Running,
            'S' => ProcState::Sleeping,
            'D' => ProcState::DiskSleep,
            'Z' => ProcState::Zombie,
            'T' => ProcState::Stopped,
            't' => ProcState::TracingStop,
            'X' | 'x' => ProcState::Dead,
            'I' => ProcState::Idle,
            other => ProcState::Other(other),
        }
    }

    pub fn code(&self) -> char {
        match self {
            ProcState::Running => 'R',
            ProcState::Sleeping => 'S',
            ProcState::DiskSleep => 'D',
            ProcState::Zombie => 'Z',
            ProcState::Stopped => 'T',
            ProcState::TracingStop => 't',
            ProcState::Dead => 'X',
            ProcState::Idle => 'I',
            ProcState::Other(c) => *c,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ProcState::Zombie | ProcState::Dead)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcState::Stopped | ProcState::TracingStop)
    }
}

/// One process at one reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSample {
    pub pid: i32,
    pub command: String,
    pub state: ProcState,
    pub user_ticks: u64,
    pub kernel_ticks: u64,
    pub virtual_bytes: u64,
    pub rss_kb: u64,
}

impl ProcessSample {
    fn cpu_ticks(&self) -> u64 {
        self.user_ticks.saturating_add(self.kernel_ticks)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRate {
    pub pid: i32,
    pub command: String,
    pub state: ProcState,
    pub cpu_delta_ticks: u64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub rss_kb: u64,
    pub virtual_bytes: u64,
}

/// Two generations of per-process readings keyed by pid.
#[derive(Debug)]
pub struct ProcessSampler {
    previous: HashMap<i32, ProcessSample>,
    current: HashMap<i32, ProcessSample>,
    total_memory_kb: u64,
}

impl ProcessSampler {
    pub fn new(total_memory_kb: u64) -> SampleResult<Self> {
        if total_memory_kb == 0 {
            return Err(SampleError::MemoryUnknown);
        }
        Ok(Self {
            previous: HashMap::new(),
            current: HashMap::new(),
            total_memory_kb,
        })
    }

    /// Replaces the current generation; the old one becomes `previous`. Pids missing from
    /// `samples` are dropped.
    pub fn update(&mut self, samples: Vec<ProcessSample>) {
        let next: HashMap<i32, ProcessSample> =
            samples.into_iter().map(|s| (s.pid, s)).collect();
        self.previous = std::mem::replace(&mut self.current, next);
    }

    pub fn pids(&self) -> impl Iterator<Item = i32> + '_ {
        self.current.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn total_memory_kb(&self) -> u64 {
        self.total_memory_kb
    }

    /// Rates for `pid` in the current reading. `total_cpu_delta` is the aggregate tick delta of
    /// the same tick; without it CPU percent is 0.
    pub fn rate_for(&self, pid: i32, total_cpu_delta: Option<u64>) -> Option<ProcessRate> {
        let cur = self.current.get(&pid)?;
        let cpu_delta_ticks = match self.previous.get(&pid) {
            None => 0,
            Some(prev) if cur.cpu_ticks() < prev.cpu_ticks() => {
                trace!(pid, command = %cur.command, "process counters regressed, pid reused");
                cur.cpu_ticks()
            }
            Some(prev) => cur.cpu_ticks() - prev.cpu_ticks(),
        };
        let cpu_percent = match total_cpu_delta {
            Some(total) if total > 0 => cpu_delta_ticks as f64 / total as f64 * 100.0,
            _ => 0.0,
        };
        let memory_percent = cur.rss_kb as f64 / self.total_memory_kb as f64 * 100.0;
        Some(ProcessRate {
            pid,
            command: cur.command.clone(),
            state: cur.state,
            cpu_delta_ticks,
            cpu_percent,
            memory_percent,
            rss_kb: cur.rss_kb,
            virtual_bytes: cur.virtual_bytes,
        })
    }
}
