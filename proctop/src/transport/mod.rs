#[cfg(feature = "networking")]
pub mod client;
#[cfg(feature = "networking")]
pub mod mtls;
#[cfg(feature = "networking")]
pub mod queue;
#[cfg(feature = "status")]
pub mod status;

#[cfg(feature = "networking")]
pub mod push {
    use super::{client::PushClient, queue::Spool};
    use crate::config::Networking;
    use anyhow::Result;
    use std::time::Duration;
    use tokio::{
        sync::mpsc::{self, Sender},
        task::JoinHandle,
        time::MissedTickBehavior,
    };
    use tracing::{info, warn};

    /// Spawns the task that spools gauge batches and POSTs them on a fixed schedule. Dropping
    /// every sender makes the task deliver what is left and exit.
    pub async fn spawn_push_task(net: &Networking) -> Result<(Sender<Vec<u8>>, JoinHandle<()>)> {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1024);
        let mut spool = Spool::open(&net.queue_dir, net.queue_max_bytes).await?;
        let client = PushClient::new(net)?;
        let max_bytes = net.batch_max_bytes;
        let retry_budget = net.retry_budget;
        let mut flush = tokio::time::interval(Duration::from_millis(net.flush_interval_ms.max(1)));
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(endpoint = %net.endpoint, "push exporter started");

        let handle = tokio::spawn(async move {
            let mut budget = RetryBudget::new(retry_budget);
            loop {
                tokio::select! {
                    line = rx.recv() => match line {
                        Some(line) => {
                            if let Err(e) = spool.enqueue(line).await {
                                warn!(error = ?e, "spooling gauge batch failed");
                            }
                        }
                        None => {
                            deliver(&spool, &client, max_bytes, &mut budget, true).await;
                            info!("push exporter stopped");
                            break;
                        }
                    },
                    _ = flush.tick() => {
                        deliver(&spool, &client, max_bytes, &mut budget, false).await;
                    }
                }
            }
        });
        Ok((tx, handle))
    }

    /// Consecutive failed posts allowed before one flush is skipped.
    #[derive(Debug)]
    pub(crate) struct RetryBudget {
        limit: usize,
        left: usize,
    }

    impl RetryBudget {
        pub(crate) fn new(limit: usize) -> Self {
            Self { limit, left: limit }
        }

        /// Whether this flush should post. An exhausted budget skips one scheduled flush and
        /// refills; the final flush before exit always posts.
        pub(crate) fn allow(&mut self, closing: bool) -> bool {
            if self.left > 0 || closing {
                return true;
            }
            self.left = self.limit;
            false
        }

        pub(crate) fn succeeded(&mut self) {
            self.left = self.limit;
        }

        /// Returns true when this failure exhausted the budget.
        pub(crate) fn failed(&mut self) -> bool {
            self.left = self.left.saturating_sub(1);
            self.left == 0
        }
    }

    /// Posts spooled batches until the spool is empty or a post fails. Batches are removed only
    /// after the endpoint accepted them.
    async fn deliver(
        spool: &Spool,
        client: &PushClient,
        max_bytes: usize,
        budget: &mut RetryBudget,
        closing: bool,
    ) {
        if !budget.allow(closing) {
            return;
        }
        loop {
            let batch = match spool.peek_batch(max_bytes).await {
                Ok(b) if b.is_empty() => return,
                Ok(b) => b,
                Err(e) => {
                    warn!(error = ?e, "reading spool failed");
                    return;
                }
            };
            let n = batch.len();
            match client.post_ndjson(batch).await {
                Ok(()) => {
                    budget.succeeded();
                    if let Err(e) = spool.pop(n).await {
                        warn!(error = ?e, "trimming spool failed");
                        return;
                    }
                    info!(batches = n, "gauges delivered");
                }
                Err(e) => {
                    warn!(error = ?e, "post failed");
                    if budget.failed() && !closing {
                        warn!("retry budget exhausted; skipping one flush");
                    }
                    return;
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::RetryBudget;

        #[test]
        fn exhausted_budget_skips_one_flush_then_refills() {
            let mut b = RetryBudget::new(2);
            assert!(b.allow(false));
            assert!(!b.failed());
            assert!(b.failed());
            assert!(!b.allow(false));
            assert!(b.allow(false));
        }

        #[test]
        fn closing_flush_posts_even_when_exhausted() {
            let mut b = RetryBudget::new(1);
            assert!(b.failed());
            assert!(b.allow(true));
        }

        #[test]
        fn success_restores_the_budget() {
            let mut b = RetryBudget::new(2);
            b.failed();
            b.succeeded();
            assert!(!b.failed());
        }
    }
}
