pub mod cpu;
pub mod fake;
pub mod os;
pub mod proc;
pub mod source;

use crate::aggregate::{Aggregation, AggregationStage};
use crate::error::SampleResult;
use crate::render::Renderer;
use crate::sink::{self, MetricsSink};
use crate::top::TopEngine;
use source::CounterSource;
use std::{future::Future, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One tick's worth of work: sample, compute rates, aggregate, and deliver.
pub struct Pipeline<S> {
    engine: TopEngine<S>,
    stage: AggregationStage,
    sink: Box<dyn MetricsSink>,
    renderer: Option<Box<dyn Renderer>>,
    // Pruned last tick; their zeros have been published once.
    ended: Vec<String>,
}

impl<S: CounterSource> Pipeline<S> {
    pub fn new(
        engine: TopEngine<S>,
        stage: AggregationStage,
        sink: impl MetricsSink + 'static,
    ) -> Self {
        Self {
            engine,
            stage,
            sink: Box::new(sink),
            renderer: None,
            ended: Vec::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Takes a baseline reading so the first tick reports a real interval.
    pub fn prime(&mut self) -> SampleResult<()> {
        match self.engine.update() {
            Err(e) if e.is_invalid_reading() => Ok(()),
            other => other,
        }
    }

    /// Runs one tick. `SourceUnavailable` skips the tick with all state retained; an invalid
    /// CPU reading only suppresses the CPU gauges.
    pub fn tick(&mut self) -> SampleResult<Aggregation> {
        match self.engine.update() {
            Ok(()) => {}
            Err(e) if e.is_invalid_reading() => {
                warn!(error = %e, "cpu rates suppressed for this tick");
            }
            Err(e) => return Err(e),
        }

        let ended = std::mem::take(&mut self.ended);
        sink::retire_commands(self.sink.as_mut(), ended.iter().map(String::as_str));

        let snap = self.engine.snapshot();
        if let Some(cpu) = &snap.cpu {
            sink::record_cpu(self.sink.as_mut(), cpu);
        }
        let agg = self.stage.accumulate(snap.processes.values());
        sink::record_groups(self.sink.as_mut(), &agg.ranked);
        let unreported: Vec<_> = agg
            .retired
            .iter()
            .filter(|r| !agg.ranked.iter().any(|g| g.command == r.command))
            .cloned()
            .collect();
        sink::record_groups(self.sink.as_mut(), &unreported);
        self.sink.flush();
        self.ended = agg.retired.iter().map(|g| g.command.clone()).collect();

        if let Some(r) = self.renderer.as_mut() {
            if let Err(e) = r.render(snap.cpu.as_ref(), &agg.ranked) {
                warn!(error = ?e, "render failed");
            }
        }
        debug!(
            processes = snap.processes.len(),
            ranked = agg.ranked.len(),
            retired = agg.retired.len(),
            "tick"
        );
        Ok(agg)
    }

    /// Records every tracked group at zero so consumers see the series end.
    pub fn retire(&mut self) {
        let groups = self.stage.retire_all();
        info!(groups = groups.len(), "retiring command groups");
        sink::record_groups(self.sink.as_mut(), &groups);
        self.sink.flush();
    }

    pub fn engine(&self) -> &TopEngine<S> {
        &self.engine
    }
}

/// Ticks every `interval` until `shutdown` resolves, then retires all groups. A slow tick
/// delays the next one; ticks never overlap or get skipped.
pub async fn run_sampling_loop<S, F>(
    mut pipeline: Pipeline<S>,
    interval: Duration,
    shutdown: F,
) -> Pipeline<S>
where
    S: CounterSource,
    F: Future<Output = ()>,
{
    if let Err(e) = pipeline.prime() {
        warn!(error = %e, "baseline read failed");
    }
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = pipeline.tick() {
                    warn!(error = %e, "tick skipped");
                }
            }
        }
    }
    pipeline.retire();
    pipeline
}
