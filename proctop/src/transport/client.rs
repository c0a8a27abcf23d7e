use super::mtls::{build_client, load_tls};
use crate::config::Networking;
use anyhow::{bail, Context, Result};
use reqwest::Client;

/// POSTs spooled NDJSON gauge batches to the configured endpoint.
pub struct PushClient {
    client: Client,
    endpoint: String,
    zstd: bool,
}

impl PushClient {
    pub fn new(net: &Networking) -> Result<Self> {
        let client = build_client(&load_tls(net)?)?;
        Ok(Self {
            client,
            endpoint: net.endpoint.clone(),
            zstd: net.compression.eq_ignore_ascii_case("zstd"),
        })
    }

    pub async fn post_ndjson(&self, lines: Vec<Vec<u8>>) -> Result<()> {
        let body: Vec<u8> = lines.concat();
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-ndjson");
        req = if self.zstd {
            let compressed = zstd::stream::encode_all(&body[..], 3).context("zstd compress")?;
            req.header("Content-Encoding", "zstd").body(compressed)
        } else {
            req.body(body)
        };
        let resp = req.send().await.context("sending gauge batch")?;
        if !resp.status().is_success() {
            bail!("push endpoint returned {}", resp.status());
        }
        Ok(())
    }
}
