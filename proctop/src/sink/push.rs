use super::{Labels, MetricsSink};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    ts: String,
    event_id: String,
    instance_id: &'a str,
    host: Option<&'a str>,
    kind: &'static str,
    body: &'a [Observation],
}

fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".into())
}

/// Buffers one tick of gauges and hands it to the push task as a single NDJSON line.
pub struct PushSink {
    instance_id: String,
    host: Option<String>,
    max_event_bytes: usize,
    pending: Vec<Observation>,
    tx: Sender<Vec<u8>>,
}

impl PushSink {
    pub fn new(
        instance_id: String,
        host: Option<String>,
        max_event_bytes: usize,
        tx: Sender<Vec<u8>>,
    ) -> Self {
        Self {
            instance_id,
            host,
            max_event_bytes,
            pending: Vec::new(),
            tx,
        }
    }

    fn encode(&self) -> Option<Vec<u8>> {
        let env = Envelope {
            ts: now_iso(),
            event_id: Uuid::new_v4().to_string(),
            instance_id: &self.instance_id,
            host: self.host.as_deref(),
            kind: "gauges",
            body: &self.pending,
        };
        let mut line = match serde_json::to_vec(&env) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = ?e, "encoding gauge batch");
                return None;
            }
        };
        line.push(b'\n');
        if line.len() > self.max_event_bytes {
            warn!(size = line.len(), max = self.max_event_bytes, "gauge batch too large, dropped");
            return None;
        }
        Some(line)
    }
}

impl MetricsSink for PushSink {
    fn record_gauge(&mut self, name: &str, value: f64, labels: &Labels) {
        self.pending.push(Observation {
            name: name.to_string(),
            value,
            labels: labels.clone(),
        });
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if let Some(line) = self.encode() {
            match self.tx.try_send(line) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!("push queue full, batch dropped"),
                Err(TrySendError::Closed(_)) => warn!("push task gone, batch dropped"),
            }
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn flush_sends_one_line_per_tick() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = PushSink::new("host-a".into(), Some("box".into()), 64 * 1024, tx);
        sink.record_gauge("node.cpu.user", 12.0, &Labels::new());
        let cmd = Labels::from([("command".to_string(), "redis".to_string())]);
        sink.record_gauge("process.cpu.usage", 3.0, &cmd);
        sink.flush();
        sink.flush();

        let line = rx.recv().await.unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let v: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(v["instance_id"], "host-a");
        assert_eq!(v["host"], "box");
        assert_eq!(v["kind"], "gauges");
        assert_eq!(v["body"][0]["name"], "node.cpu.user");
        assert!(v["body"][0].get("labels").is_none());
        assert_eq!(v["body"][1]["labels"]["command"], "redis");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn oversized_batch_is_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = PushSink::new("i".into(), None, 16, tx);
        sink.record_gauge("node.cpu.user", 1.0, &Labels::new());
        sink.flush();
        assert!(rx.try_recv().is_err());
    }
}
