//! Configuration module
//!
//! Host configuration is read from the environment (optionally via a `.env` file):
//! the hosted identity, drive storage location, transit perimeter limits, the
//! malware scanner and the inbox worker pool.

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};

use crate::models::OdinId;

const SERVER_PORT: u16 = 3000;
const DATA_DIR: &str = "./data";
const MAX_KEY_HEADER_BYTES: u64 = 64 * 1024;
const MAX_METADATA_BYTES: u64 = 1024 * 1024;
const MAX_PAYLOAD_BYTES: u64 = 100 * 1024 * 1024;
const REQUEST_TIMEOUT_SECS: u64 = 300;
const CLAMAV_PORT: u16 = 3310;
const INBOX_WORKER_MAX_WORKERS: usize = 4;
const INBOX_WORKER_POLL_INTERVAL_MS: u64 = 1000;
const INBOX_WORKER_BATCH_SIZE: u32 = 10;
const INBOX_WORKER_MAX_ATTEMPTS: u32 = 5;
const INBOX_WORKER_STALE_POP_SECS: u64 = 300;
const SHARED_SECRET_LEN: usize = 32;

/// Secret bytes that never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for SecretBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "SecretBytes([REDACTED; {}])", self.0.len())
    }
}

/// Transit perimeter settings
#[derive(Clone, Debug)]
pub struct TransitConfig {
    pub shared_secret: SecretBytes,
    /// First entry is the current key; the rest are previous keys still accepted.
    pub public_key_crcs: Vec<u32>,
    pub allowed_senders: Vec<OdinId>,
    pub max_key_header_bytes: u64,
    pub max_metadata_bytes: u64,
    pub max_payload_bytes: u64,
    /// 0 disables the per-sender rate filter.
    pub sender_rate_limit_per_minute: u32,
    pub retain_quarantined: bool,
    pub request_timeout_secs: u64,
    // ClamAV configuration
    pub clamav_enabled: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_fail_closed: bool,
}

/// Inbox worker pool settings
#[derive(Clone, Debug)]
pub struct InboxWorkerSettings {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub stale_pop_secs: u64,
}

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub environment: String,
    /// JSON log lines instead of the compact console format.
    pub log_json: bool,
    pub server_port: u16,
    pub tenant: String,
    pub data_dir: PathBuf,
    pub inbox_database_path: PathBuf,
    pub transit: TransitConfig,
    pub inbox_worker: InboxWorkerSettings,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<HostConfig>);

impl Config {
    fn as_host(&self) -> &HostConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_host().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = HostConfig::from_lookup(&lookup)?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_host().validate()
    }

    pub fn environment(&self) -> &str {
        &self.as_host().environment
    }

    pub fn log_json(&self) -> bool {
        self.as_host().log_json
    }

    pub fn server_port(&self) -> u16 {
        self.as_host().server_port
    }

    /// Identity hosted by this node.
    pub fn tenant(&self) -> Result<OdinId, anyhow::Error> {
        self.as_host().tenant.parse()
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.as_host().data_dir
    }

    pub fn inbox_database_path(&self) -> &PathBuf {
        &self.as_host().inbox_database_path
    }

    pub fn transit(&self) -> &TransitConfig {
        &self.as_host().transit
    }

    pub fn inbox_worker(&self) -> &InboxWorkerSettings {
        &self.as_host().inbox_worker
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.as_host().transit.max_payload_bytes
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.as_host().transit.request_timeout_secs
    }

    pub fn clamav_enabled(&self) -> bool {
        self.as_host().transit.clamav_enabled
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_lowercase())
        .and_then(|v| match v.as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl HostConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let log_json = lookup("LOG_FORMAT")
            .map(|v| v.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let server_port = match lookup("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            None => SERVER_PORT,
        };

        let tenant = lookup("TENANT_ODIN_ID")
            .ok_or_else(|| anyhow::anyhow!("TENANT_ODIN_ID must be set"))?
            .trim()
            .to_string();

        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| DATA_DIR.to_string()));
        let inbox_database_path = lookup("INBOX_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("inbox.db"));

        let shared_secret = lookup("TRANSIT_SHARED_SECRET")
            .ok_or_else(|| anyhow::anyhow!("TRANSIT_SHARED_SECRET must be set"))?;
        let shared_secret = general_purpose::STANDARD
            .decode(shared_secret.trim())
            .map_err(|e| anyhow::anyhow!("TRANSIT_SHARED_SECRET must be base64: {}", e))?;

        let public_key_crcs = lookup("TRANSIT_PUBLIC_KEY_CRCS")
            .ok_or_else(|| anyhow::anyhow!("TRANSIT_PUBLIC_KEY_CRCS must be set"))?;
        let public_key_crcs = split_list(&public_key_crcs)
            .map(|crc| {
                crc.parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("Invalid public key CRC: {}", crc))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let allowed_senders = lookup("TRANSIT_ALLOWED_SENDERS")
            .map(|list| {
                split_list(&list)
                    .map(|id| id.parse::<OdinId>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let transit = TransitConfig {
            shared_secret: SecretBytes::new(shared_secret),
            public_key_crcs,
            allowed_senders,
            max_key_header_bytes: parse_or(
                lookup,
                "TRANSIT_MAX_KEY_HEADER_BYTES",
                MAX_KEY_HEADER_BYTES,
            ),
            max_metadata_bytes: parse_or(lookup, "TRANSIT_MAX_METADATA_BYTES", MAX_METADATA_BYTES),
            max_payload_bytes: parse_or(lookup, "TRANSIT_MAX_PAYLOAD_BYTES", MAX_PAYLOAD_BYTES),
            sender_rate_limit_per_minute: parse_or(
                lookup,
                "TRANSIT_SENDER_RATE_LIMIT_PER_MINUTE",
                0,
            ),
            retain_quarantined: parse_bool_or(lookup, "TRANSIT_RETAIN_QUARANTINED", false),
            request_timeout_secs: parse_or(lookup, "REQUEST_TIMEOUT_SECS", REQUEST_TIMEOUT_SECS),
            clamav_enabled: parse_bool_or(lookup, "CLAMAV_ENABLED", false),
            clamav_host: lookup("CLAMAV_HOST").unwrap_or_else(|| "localhost".to_string()),
            clamav_port: parse_or(lookup, "CLAMAV_PORT", CLAMAV_PORT),
            clamav_fail_closed: parse_bool_or(lookup, "CLAMAV_FAIL_CLOSED", true),
        };

        let inbox_worker = InboxWorkerSettings {
            max_workers: parse_or(lookup, "INBOX_WORKER_MAX_WORKERS", INBOX_WORKER_MAX_WORKERS),
            poll_interval_ms: parse_or(
                lookup,
                "INBOX_WORKER_POLL_INTERVAL_MS",
                INBOX_WORKER_POLL_INTERVAL_MS,
            ),
            batch_size: parse_or(lookup, "INBOX_WORKER_BATCH_SIZE", INBOX_WORKER_BATCH_SIZE),
            max_attempts: parse_or(lookup, "INBOX_WORKER_MAX_ATTEMPTS", INBOX_WORKER_MAX_ATTEMPTS),
            stale_pop_secs: parse_or(
                lookup,
                "INBOX_WORKER_STALE_POP_SECS",
                INBOX_WORKER_STALE_POP_SECS,
            ),
        };

        Ok(HostConfig {
            environment,
            log_json,
            server_port,
            tenant,
            data_dir,
            inbox_database_path,
            transit,
            inbox_worker,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.tenant.is_empty() {
            return Err(anyhow::anyhow!("TENANT_ODIN_ID must not be empty"));
        }
        self.tenant
            .parse::<OdinId>()
            .map_err(|e| anyhow::anyhow!("TENANT_ODIN_ID is invalid: {}", e))?;

        if self.transit.public_key_crcs.is_empty() {
            return Err(anyhow::anyhow!(
                "TRANSIT_PUBLIC_KEY_CRCS must list at least one key"
            ));
        }
        if self.transit.public_key_crcs.contains(&0) {
            return Err(anyhow::anyhow!("TRANSIT_PUBLIC_KEY_CRCS must not contain 0"));
        }

        if self.transit.shared_secret.expose().len() != SHARED_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "TRANSIT_SHARED_SECRET must decode to {} bytes",
                SHARED_SECRET_LEN
            ));
        }

        if self.transit.max_key_header_bytes == 0
            || self.transit.max_metadata_bytes == 0
            || self.transit.max_payload_bytes == 0
        {
            return Err(anyhow::anyhow!("Transit part size limits must be non-zero"));
        }

        if self.inbox_worker.max_workers == 0 {
            return Err(anyhow::anyhow!("INBOX_WORKER_MAX_WORKERS must be at least 1"));
        }
        if self.inbox_worker.batch_size == 0 {
            return Err(anyhow::anyhow!("INBOX_WORKER_BATCH_SIZE must be at least 1"));
        }

        if self.transit.clamav_enabled && self.transit.clamav_host.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "CLAMAV_HOST must be set when CLAMAV_ENABLED=true"
            ));
        }

        Ok(())
    }
}
