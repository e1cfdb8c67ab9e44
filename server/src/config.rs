use ipnet::IpNet;
use secrecy::SecretString;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

#[derive(Deserialize)]
pub struct Config {
    pub listen_addr: String,
    pub database_path: PathBuf,
    /// Unset or empty disables signature checks.
    #[serde(default)]
    pub github_webhook_secret: Option<SecretString>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    /// Mounts the unsigned `/api/webhook/github/sync` route.
    #[serde(default)]
    pub manual_sync: bool,
    /// Who may call the manual sync route.
    #[serde(default)]
    pub allowed_ip_ranges: Vec<IpNet>,
}
