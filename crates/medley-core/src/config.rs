//! Configuration module
//!
//! Env-based configuration for the server, database, session store, chunk
//! storage layout, dispatch queue, cleanup sweeper and transcoder. Load with
//! [`Config::from_env`] and run [`Config::validate`] before wiring services.

use std::env;

const DEFAULT_SERVER_PORT: u16 = 3000;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_QUEUE_WORKERS_PER_KIND: usize = 2;
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_QUEUE_MAX_ATTEMPTS: i32 = 3;
const DEFAULT_QUEUE_STALE_REQUEUE_INTERVAL_SECS: u64 = 60;
const DEFAULT_QUEUE_STALE_CLAIM_GRACE_SECS: i64 = 600;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_PENDING_DEADLINE_HOURS: i64 = 72;

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Root directory for all media artifacts.
    pub base_path: String,
    /// Staging area for in-flight chunk uploads, one subdirectory per upload id.
    pub staging_dir: String,
    /// Reassembled originals land here.
    pub origin_dir: String,
    /// Transcoded outputs and thumbnails land here.
    pub processed_dir: String,
    /// Base URL under which processed files are served.
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub workers_per_kind: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: i32,
    /// Interval between runs of the stale-delivery requeue task. 0 = disabled.
    pub stale_requeue_interval_secs: u64,
    /// A running delivery older than this is assumed lost and requeued.
    pub stale_claim_grace_secs: i64,
}

#[derive(Clone, Debug)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    /// Pending rows older than this many hours are orphans.
    pub pending_deadline_hours: i64,
}

#[derive(Clone, Debug)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// When unset, the in-memory session store is used (single-node only).
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub environment: String,
    pub cors_origins: Vec<String>,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub queue: QueueConfig,
    pub cleanup: CleanupConfig,
    pub transcode: TranscodeConfig,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let base_path = env_or("MEDLEY_STORAGE_PATH", "/var/lib/medley/media");
        let storage = StorageConfig {
            staging_dir: env_or("MEDLEY_STAGING_DIR", "staging"),
            origin_dir: env_or("MEDLEY_ORIGIN_DIR", "origin"),
            processed_dir: env_or("MEDLEY_PROCESSED_DIR", "processed"),
            public_base_url: env_or("MEDLEY_PUBLIC_BASE_URL", "http://localhost:3000/media"),
            base_path,
        };

        Ok(Config {
            server_port: env_parse_or("MEDLEY_SERVER_PORT", DEFAULT_SERVER_PORT),
            database_url,
            redis_url: env::var("REDIS_URL").ok(),
            jwt_secret: env_or("MEDLEY_JWT_SECRET", ""),
            environment: env_or("MEDLEY_ENVIRONMENT", "development"),
            cors_origins: env_or("MEDLEY_CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            storage,
            session: SessionConfig {
                ttl_secs: env_parse_or("MEDLEY_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS),
            },
            queue: QueueConfig {
                workers_per_kind: env_parse_or(
                    "MEDLEY_QUEUE_WORKERS_PER_KIND",
                    DEFAULT_QUEUE_WORKERS_PER_KIND,
                ),
                poll_interval_ms: env_parse_or(
                    "MEDLEY_QUEUE_POLL_INTERVAL_MS",
                    DEFAULT_QUEUE_POLL_INTERVAL_MS,
                ),
                max_attempts: env_parse_or("MEDLEY_QUEUE_MAX_ATTEMPTS", DEFAULT_QUEUE_MAX_ATTEMPTS),
                stale_requeue_interval_secs: env_parse_or(
                    "MEDLEY_QUEUE_STALE_REQUEUE_INTERVAL_SECS",
                    DEFAULT_QUEUE_STALE_REQUEUE_INTERVAL_SECS,
                ),
                stale_claim_grace_secs: env_parse_or(
                    "MEDLEY_QUEUE_STALE_CLAIM_GRACE_SECS",
                    DEFAULT_QUEUE_STALE_CLAIM_GRACE_SECS,
                ),
            },
            cleanup: CleanupConfig {
                interval_secs: env_parse_or(
                    "MEDLEY_CLEANUP_INTERVAL_SECS",
                    DEFAULT_CLEANUP_INTERVAL_SECS,
                ),
                pending_deadline_hours: env_parse_or(
                    "MEDLEY_PENDING_DEADLINE_HOURS",
                    DEFAULT_PENDING_DEADLINE_HOURS,
                ),
            },
            transcode: TranscodeConfig {
                ffmpeg_path: env_or("MEDLEY_FFMPEG_PATH", "ffmpeg"),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.jwt_secret.is_empty() {
            anyhow::bail!("MEDLEY_JWT_SECRET must be set");
        }
        if self.is_production() && self.jwt_secret.len() < 32 {
            anyhow::bail!("MEDLEY_JWT_SECRET must be at least 32 bytes in production");
        }
        if self.storage.base_path.is_empty() {
            anyhow::bail!("MEDLEY_STORAGE_PATH must not be empty");
        }
        if self.queue.workers_per_kind == 0 {
            anyhow::bail!("MEDLEY_QUEUE_WORKERS_PER_KIND must be at least 1");
        }
        if self.queue.max_attempts < 1 {
            anyhow::bail!("MEDLEY_QUEUE_MAX_ATTEMPTS must be at least 1");
        }
        if self.cleanup.pending_deadline_hours < 1 {
            anyhow::bail!("MEDLEY_PENDING_DEADLINE_HOURS must be at least 1");
        }
        Ok(())
    }
}
