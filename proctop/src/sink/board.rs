use super::{Labels, MetricsSink};
use std::{
    collections::BTreeMap,
    fmt::Write,
    sync::{Arc, Mutex, MutexGuard},
};

type Key = (String, Labels);

/// Latest value of every gauge. Clones share the same board, so the status server can read
/// what the sampling loop writes.
#[derive(Clone, Default)]
pub struct GaugeBoard {
    inner: Arc<Mutex<BTreeMap<Key, f64>>>,
}

impl GaugeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Key, f64>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, name: &str, labels: &Labels) -> Option<f64> {
        self.lock().get(&(name.to_string(), labels.clone())).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Prometheus text exposition of every gauge, dots in names mapped to underscores.
    pub fn render_prometheus(&self) -> String {
        let gauges = self.lock();
        let mut out = String::new();
        let mut last_name: Option<&str> = None;
        for ((name, labels), value) in gauges.iter() {
            let metric = name.replace('.', "_");
            if last_name != Some(name.as_str()) {
                let _ = writeln!(out, "# TYPE {metric} gauge");
                last_name = Some(name.as_str());
            }
            out.push_str(&metric);
            if !labels.is_empty() {
                let pairs: Vec<String> = labels
                    .iter()
                    .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
                    .collect();
                let _ = write!(out, "{{{}}}", pairs.join(","));
            }
            let _ = writeln!(out, " {value}");
        }
        out
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

impl MetricsSink for GaugeBoard {
    fn record_gauge(&mut self, name: &str, value: f64, labels: &Labels) {
        self.lock().insert((name.to_string(), labels.clone()), value);
    }

    fn retire_series(&mut self, labels: &Labels) {
        self.lock().retain(|(_, l), _| l != labels);
    }
}
