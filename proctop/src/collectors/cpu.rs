use crate::error::{SampleError, SampleResult};
use serde::Serialize;
use tracing::trace;

/// Aggregate CPU time accumulators from the `cpu` line of `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuCounters {
    fn fields(&self) -> [u64; 10] {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
    }
}

/// Share of CPU time per category since the previous reading. Each field is a percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuRateSnapshot {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl CpuRateSnapshot {
    pub const CATEGORIES: [&'static str; 10] = [
        "user",
        "nice",
        "system",
        "idle",
        "iowait",
        "irq",
        "softirq",
        "steal",
        "guest",
        "guest_nice",
    ];

    fn from_shares(s: [f64; 10]) -> Self {
        Self {
            user: s[0],
            nice: s[1],
            system: s[2],
            idle: s[3],
            iowait: s[4],
            irq: s[5],
            softirq: s[6],
            steal: s[7],
            guest: s[8],
            guest_nice: s[9],
        }
    }

    /// Category name and percentage, in `/proc/stat` column order.
    pub fn categories(&self) -> [(&'static str, f64); 10] {
        let v = [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ];
        let mut out = [("", 0.0); 10];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (Self::CATEGORIES[i], v[i]);
        }
        out
    }

    pub fn busy(&self) -> f64 {
        100.0 - self.idle - self.iowait
    }
}

/// Keeps the last two aggregate readings and derives per-category shares from them.
#[derive(Debug, Default)]
pub struct CpuSampler {
    previous: CpuCounters,
    current: CpuCounters,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `counters` as the current reading. The reading is kept even when this fails,
    /// so a counter reset becomes the baseline for the next tick.
    pub fn update(&mut self, counters: CpuCounters) -> SampleResult<()> {
        self.previous = std::mem::replace(&mut self.current, counters);
        self.deltas().map(|_| ())
    }

    pub fn snapshot(&self) -> SampleResult<CpuRateSnapshot> {
        let (deltas, total) = self.deltas()?;
        let total = total as f64;
        let mut shares = [0.0; 10];
        for (share, d) in shares.iter_mut().zip(deltas) {
            *share = d as f64 / total * 100.0;
        }
        Ok(CpuRateSnapshot::from_shares(shares))
    }

    /// Ticks elapsed across all categories between the two readings, if they form a valid pair.
    pub fn total_delta(&self) -> Option<u64> {
        self.deltas().ok().map(|(_, total)| total)
    }

    pub fn current(&self) -> &CpuCounters {
        &self.current
    }

    /// Per-category deltas and their sum. A category that went backwards contributes 0 for
    /// this pair; only a non-positive total makes the pair invalid.
    fn deltas(&self) -> SampleResult<([u64; 10], u64)> {
        let prev = self.previous.fields();
        let cur = self.current.fields();
        let mut deltas = [0u64; 10];
        let mut total: i128 = 0;
        for (i, (c, p)) in cur.iter().zip(prev).enumerate() {
            let d = *c as i128 - p as i128;
            total += d;
            if d < 0 {
                trace!(
                    category = CpuRateSnapshot::CATEGORIES[i],
                    delta = d,
                    "cpu counter regressed"
                );
                continue;
            }
            deltas[i] = d as u64;
        }
        if total <= 0 {
            return Err(SampleError::InvalidReading { total_delta: total });
        }
        Ok((deltas, deltas.iter().sum()))
    }
}
