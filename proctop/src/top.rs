use crate::collectors::{
    cpu::{CpuRateSnapshot, CpuSampler},
    proc::{ProcessRate, ProcessSampler},
    source::CounterSource,
};
use crate::error::SampleResult;
use std::collections::HashMap;
use tracing::info;

/// Rates for one tick. `cpu` is `None` when the aggregate reading was unusable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopSnapshot {
    pub cpu: Option<CpuRateSnapshot>,
    pub processes: HashMap<i32, ProcessRate>,
}

/// Drives the CPU and process samplers from a single counter source.
pub struct TopEngine<S> {
    source: S,
    cpu: CpuSampler,
    procs: ProcessSampler,
}

impl<S: CounterSource> TopEngine<S> {
    /// Fails when total memory cannot be determined; nothing downstream is meaningful without it.
    pub fn new(mut source: S) -> SampleResult<Self> {
        let total_memory_kb = source.total_memory_kb()?;
        let procs = ProcessSampler::new(total_memory_kb)?;
        info!(total_memory_kb, "sampler ready");
        Ok(Self {
            source,
            cpu: CpuSampler::new(),
            procs,
        })
    }

    /// Reads both counter sets, then advances both samplers. A failed read leaves the
    /// samplers untouched. `InvalidReading` is returned after both samplers advanced.
    pub fn update(&mut self) -> SampleResult<()> {
        let counters = self.source.read_cpu_totals()?;
        let samples = self.source.read_processes()?;
        let cpu = self.cpu.update(counters);
        self.procs.update(samples);
        cpu
    }

    pub fn snapshot(&self) -> TopSnapshot {
        let total = self.cpu.total_delta();
        let processes = self
            .procs
            .pids()
            .filter_map(|pid| self.procs.rate_for(pid, total).map(|r| (pid, r)))
            .collect();
        TopSnapshot {
            cpu: self.cpu.snapshot().ok(),
            processes,
        }
    }

    pub fn total_memory_kb(&self) -> u64 {
        self.procs.total_memory_kb()
    }

    pub fn process_count(&self) -> usize {
        self.procs.len()
    }
}
