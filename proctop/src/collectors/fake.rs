//! Replays scripted readings; used by tests and by anything that needs a deterministic source.

use super::{cpu::CpuCounters, proc::ProcessSample, source::CounterSource};
use crate::error::{SampleError, SampleResult};
use std::collections::VecDeque;
use std::io;

#[derive(Debug, Clone, Default)]
pub struct Reading {
    pub cpu: CpuCounters,
    pub processes: Vec<ProcessSample>,
}

#[derive(Debug, Clone)]
enum Step {
    Ok(Reading),
    Fail,
}

/// Each `read_cpu_totals` call consumes one scripted step; the following
/// `read_processes` returns that step's process list.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    total_memory_kb: u64,
    steps: VecDeque<Step>,
    pending: Option<Vec<ProcessSample>>,
}

impl ScriptedSource {
    pub fn new(total_memory_kb: u64) -> Self {
        Self {
            total_memory_kb,
            steps: VecDeque::new(),
            pending: None,
        }
    }

    pub fn push(mut self, reading: Reading) -> Self {
        self.steps.push_back(Step::Ok(reading));
        self
    }

    /// Scripts a read that fails as if `/proc` were unreadable.
    pub fn push_failure(mut self) -> Self {
        self.steps.push_back(Step::Fail);
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl CounterSource for ScriptedSource {
    fn read_cpu_totals(&mut self) -> SampleResult<CpuCounters> {
        match self.steps.pop_front() {
            Some(Step::Ok(r)) => {
                self.pending = Some(r.processes);
                Ok(r.cpu)
            }
            Some(Step::Fail) => Err(SampleError::source_unavailable(
                "scripted",
                io::Error::new(io::ErrorKind::PermissionDenied, "scripted failure"),
            )),
            None => Err(SampleError::source_unavailable(
                "scripted",
                io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"),
            )),
        }
    }

    fn read_processes(&mut self) -> SampleResult<Vec<ProcessSample>> {
        self.pending.take().ok_or_else(|| {
            SampleError::source_unavailable(
                "scripted",
                io::Error::new(io::ErrorKind::Other, "no pending process list"),
            )
        })
    }

    fn total_memory_kb(&mut self) -> SampleResult<u64> {
        Ok(self.total_memory_kb)
    }
}
