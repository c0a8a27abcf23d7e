use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, Rng};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

/// On-disk spool of NDJSON gauge batches awaiting delivery, oldest first, capped in bytes.
pub struct Spool {
    dir: PathBuf,
    cap_bytes: u64,
}

impl Spool {
    pub async fn open(dir: &Path, cap_bytes: u64) -> Result<Self> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating spool {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            cap_bytes,
        })
    }

    pub async fn enqueue(&mut self, data: Vec<u8>) -> Result<()> {
        self.enforce_cap(data.len() as u64).await?;
        let p = self.dir.join(format!("{:020}-{}.ndjson", now_ms(), rand_str(6)));
        let mut f = fs::File::create(&p).await?;
        f.write_all(&data).await?;
        f.flush().await?;
        Ok(())
    }

    /// Oldest batches whose combined size stays under `max_bytes`. Always yields at least one
    /// batch when the spool is non-empty.
    pub async fn peek_batch(&self, max_bytes: usize) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        let mut bytes = 0usize;
        for (p, sz) in self.entries().await? {
            if !out.is_empty() && bytes + sz as usize > max_bytes {
                break;
            }
            bytes += sz as usize;
            out.push(fs::read(&p).await?);
        }
        Ok(out)
    }

    /// Removes the `n` oldest batches after they were delivered.
    pub async fn pop(&self, n: usize) -> Result<()> {
        for (p, _) in self.entries().await?.into_iter().take(n) {
            fs::remove_file(&p).await?;
        }
        Ok(())
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    /// Sorted by name, which starts with the enqueue time.
    async fn entries(&self) -> Result<Vec<(PathBuf, u64)>> {
        let mut rd = fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(e) = rd.next_entry().await? {
            let md = e.metadata().await?;
            if md.is_file() {
                files.push((e.path(), md.len()));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Drops the oldest batches until `incoming` more bytes fit under the cap.
    async fn enforce_cap(&self, incoming: u64) -> Result<()> {
        let files = self.entries().await?;
        let mut total: u64 = files.iter().map(|(_, sz)| sz).sum::<u64>() + incoming;
        for (old, sz) in files {
            if total <= self.cap_bytes {
                break;
            }
            let _ = fs::remove_file(&old).await;
            total = total.saturating_sub(sz);
        }
        Ok(())
    }
}

fn rand_str(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

fn now_ms() -> i128 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}
