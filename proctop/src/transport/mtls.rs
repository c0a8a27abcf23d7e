use crate::config::Networking;
use anyhow::{Context, Result};
use reqwest::{Certificate, Client, Identity};
use std::{fs, path::Path};

/// Optional CA root and client identity for the push endpoint.
#[derive(Default)]
pub struct TlsMaterials {
    pub ca: Option<Certificate>,
    pub identity: Option<Identity>,
}

fn read_pem(p: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(p).with_context(|| format!("reading {what} {}", p.display()))
}

pub fn load_tls(net: &Networking) -> Result<TlsMaterials> {
    let ca = match net.ca_cert.as_deref() {
        Some(p) => {
            let pem = read_pem(p, "CA")?;
            Some(Certificate::from_pem(&pem).context("parsing CA PEM")?)
        }
        None => None,
    };
    let identity = match (net.client_cert.as_deref(), net.client_key.as_deref()) {
        (Some(cp), Some(kp)) => {
            let mut pem = read_pem(cp, "client cert")?;
            pem.push(b'\n');
            pem.extend(read_pem(kp, "client key")?);
            Some(Identity::from_pem(&pem).context("parsing client identity PEM (PKCS8)")?)
        }
        (None, None) => None,
        _ => anyhow::bail!("client_cert and client_key must be set together"),
    };
    Ok(TlsMaterials { ca, identity })
}

pub fn build_client(tls: &TlsMaterials) -> Result<Client> {
    let mut b = Client::builder()
        .use_rustls_tls()
        .tcp_nodelay(true)
        .pool_max_idle_per_host(2)
        .timeout(std::time::Duration::from_secs(10));
    if let Some(ca) = &tls.ca {
        b = b.add_root_certificate(ca.clone());
    }
    if let Some(id) = &tls.identity {
        b = b.identity(id.clone());
    }
    b.build().context("building push client")
}
