use super::{
    cpu::CpuCounters,
    proc::{ProcState, ProcessSample},
};
use crate::error::{SampleError, SampleResult};
use procfs::{Current, CurrentSI, KernelStats, Meminfo};
use tracing::debug;

/// Where the engine reads kernel counters from.
pub trait CounterSource {
    fn read_cpu_totals(&mut self) -> SampleResult<CpuCounters>;
    fn read_processes(&mut self) -> SampleResult<Vec<ProcessSample>>;
    /// Read once at startup.
    fn total_memory_kb(&mut self) -> SampleResult<u64>;
}

impl<S: CounterSource + ?Sized> CounterSource for Box<S> {
    fn read_cpu_totals(&mut self) -> SampleResult<CpuCounters> {
        (**self).read_cpu_totals()
    }
    fn read_processes(&mut self) -> SampleResult<Vec<ProcessSample>> {
        (**self).read_processes()
    }
    fn total_memory_kb(&mut self) -> SampleResult<u64> {
        (**self).total_memory_kb()
    }
}

/// Reads `/proc/stat`, `/proc/meminfo` and `/proc/<pid>/stat`.
pub struct ProcfsSource {
    page_kb: u64,
}

impl ProcfsSource {
    pub fn new() -> Self {
        // SAFETY: sysconf has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_kb = if page > 0 { page as u64 / 1024 } else { 4 };
        Self { page_kb }
    }
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for ProcfsSource {
    fn read_cpu_totals(&mut self) -> SampleResult<CpuCounters> {
        let stat = KernelStats::current()
            .map_err(|e| SampleError::source_unavailable("/proc/stat", e))?;
        let t = stat.total;
        Ok(CpuCounters {
            user: t.user,
            nice: t.nice,
            system: t.system,
            idle: t.idle,
            iowait: t.iowait.unwrap_or(0),
            irq: t.irq.unwrap_or(0),
            softirq: t.softirq.unwrap_or(0),
            steal: t.steal.unwrap_or(0),
            guest: t.guest.unwrap_or(0),
            guest_nice: t.guest_nice.unwrap_or(0),
        })
    }

    fn read_processes(&mut self) -> SampleResult<Vec<ProcessSample>> {
        let procs = procfs::process::all_processes()
            .map_err(|e| SampleError::source_unavailable("/proc", e))?;
        let mut out = Vec::new();
        for p in procs {
            // Processes can exit between the directory listing and the stat read.
            let stat = match p.and_then(|p| p.stat()) {
                Ok(s) => s,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable process");
                    continue;
                }
            };
            out.push(ProcessSample {
                pid: stat.pid,
                state: ProcState::from_code(stat.state),
                user_ticks: stat.utime,
                kernel_ticks: stat.stime,
                virtual_bytes: stat.vsize,
                rss_kb: stat.rss.saturating_mul(self.page_kb),
                command: stat.comm,
            });
        }
        Ok(out)
    }

    fn total_memory_kb(&mut self) -> SampleResult<u64> {
        let mem =
            Meminfo::current().map_err(|e| SampleError::source_unavailable("/proc/meminfo", e))?;
        Ok(mem.mem_total / 1024)
    }
}
