//! Daemon configuration, built once from SIPHON_* environment variables and
//! injected into every component at construction.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use siphon_core::application::{AllocatorConfig, ConsumerConfig, PoolConfig};

const DEFAULT_DB_PATH: &str = "~/.siphon/siphon.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9643;
const DEFAULT_MODE: &str = "MW";

/// Which roles this process runs (from the MODE launch convention:
/// "M" master, "W" worker, "MW" both)
#[derive(Debug, Clone, Copy)]
pub struct Roles {
    pub master: bool,
    pub worker: bool,
}

impl Roles {
    fn parse(mode: &str) -> Self {
        Self {
            master: mode.contains('M'),
            worker: mode.contains('W'),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub roles: Roles,
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub worker_id: String,
    /// Clear the worker registry before registering (full-system restart)
    pub reset_workers: bool,
    pub allocator: AllocatorConfig,
    pub pool: PoolConfig,
    pub consumer: ConsumerConfig,
    /// Run this command per message (body on stdin); None falls back to the
    /// fixed-delay handler
    pub handler_command: Option<Vec<String>>,
    pub handler_delay: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        let mode = env_or("SIPHON_MODE", DEFAULT_MODE);
        let roles = Roles::parse(&mode);
        if !roles.master && !roles.worker {
            anyhow::bail!("SIPHON_MODE {} enables no role (expected M, W or MW)", mode);
        }

        let db_path = std::env::var("SIPHON_DB_PATH")
            .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());

        let handler_command = std::env::var("SIPHON_HANDLER_COMMAND")
            .ok()
            .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts: &Vec<String>| !parts.is_empty());

        Ok(Self {
            roles,
            db_path,
            rpc_host: env_or("SIPHON_RPC_HOST", DEFAULT_RPC_HOST),
            rpc_port: env_parse("SIPHON_RPC_PORT", DEFAULT_RPC_PORT)?,
            worker_id: std::env::var("SIPHON_WORKER_ID")
                .unwrap_or_else(|_| format!("worker-{}", std::process::id())),
            reset_workers: env_parse("SIPHON_RESET_WORKERS", false)?,
            allocator: AllocatorConfig {
                max_worker_load: env_parse(
                    "SIPHON_MAX_LOAD",
                    AllocatorConfig::default().max_worker_load,
                )?,
            },
            pool: PoolConfig {
                max_slots: env_parse("SIPHON_MAX_CONSUMERS", PoolConfig::default().max_slots)?,
                usage_limit: env_parse(
                    "SIPHON_CONSUMER_USAGE_LIMIT",
                    PoolConfig::default().usage_limit,
                )?,
                tick_interval: Duration::from_millis(env_parse(
                    "SIPHON_POLL_INTERVAL_MS",
                    PoolConfig::default().tick_interval.as_millis() as u64,
                )?),
            },
            consumer: ConsumerConfig {
                default_concurrency: env_parse(
                    "SIPHON_DEFAULT_CONCURRENCY",
                    ConsumerConfig::default().default_concurrency,
                )?,
                receive_wait: Duration::from_secs(env_parse(
                    "SIPHON_RECEIVE_WAIT_SECS",
                    ConsumerConfig::default().receive_wait.as_secs(),
                )?),
                visibility_timeout: Duration::from_secs(env_parse(
                    "SIPHON_VISIBILITY_TIMEOUT_SECS",
                    ConsumerConfig::default().visibility_timeout.as_secs(),
                )?),
                poll_backoff: Duration::from_millis(env_parse(
                    "SIPHON_POLL_BACKOFF_MS",
                    ConsumerConfig::default().poll_backoff.as_millis() as u64,
                )?),
            },
            handler_command,
            handler_delay: Duration::from_millis(env_parse("SIPHON_HANDLER_DELAY_MS", 3000u64)?),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {}", key)),
        Err(_) => Ok(default),
    }
}
