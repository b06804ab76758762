use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use medley_api::auth::AuthKeys;
use medley_api::progress::ProgressHub;
use medley_api::services::{MediaLifecycleService, UploadService};
use medley_api::state::AppState;
use medley_api::{setup, telemetry};
use medley_core::models::MediaKind;
use medley_core::Config;
use medley_db::{DispatchQueueRepository, MediaFileRepository};
use medley_processing::FfmpegTranscoder;
use medley_session::{MemorySessionStore, RedisSessionStore, SessionStore};
use medley_storage::ChunkStore;
use medley_worker::{start_stale_requeue, CleanupSweeper, DispatchWorkerPool, WorkerContext};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.validate()?;
    telemetry::init_telemetry();

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    medley_db::run_migrations(&pool).await?;
    tracing::info!("Database connected and migrated");

    let chunk_store = ChunkStore::new(
        &config.storage.base_path,
        &config.storage.staging_dir,
        &config.storage.origin_dir,
        &config.storage.processed_dir,
    )
    .await?;

    let sessions: Arc<dyn SessionStore> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(RedisSessionStore::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory session store (single instance only)");
            Arc::new(MemorySessionStore::new())
        }
    };

    let media_repo = Arc::new(MediaFileRepository::new(pool.clone()));
    let queue_repo = DispatchQueueRepository::new(pool.clone(), config.queue.max_attempts);
    let progress_hub = ProgressHub::new();

    let transcoder = Arc::new(FfmpegTranscoder::new(
        config.transcode.ffmpeg_path.clone(),
        chunk_store.processed_dir(),
    )?);

    let worker_ctx = Arc::new(WorkerContext {
        media_files: media_repo.clone(),
        chunk_store: chunk_store.clone(),
        transcoder,
        notifier: Arc::new(progress_hub.clone()),
        public_base_url: config.storage.public_base_url.clone(),
    });

    let poll_interval = Duration::from_millis(config.queue.poll_interval_ms);
    let worker_pools = [MediaKind::Image, MediaKind::Video].map(|kind| {
        DispatchWorkerPool::start(
            kind,
            queue_repo.clone(),
            worker_ctx.clone(),
            config.queue.workers_per_kind,
            poll_interval,
        )
    });

    let _stale_requeue = (config.queue.stale_requeue_interval_secs > 0).then(|| {
        start_stale_requeue(
            queue_repo.clone(),
            Duration::from_secs(config.queue.stale_requeue_interval_secs),
            config.queue.stale_claim_grace_secs,
        )
    });

    let sweeper = Arc::new(CleanupSweeper::new(
        media_repo.clone(),
        chunk_store.clone(),
        Duration::from_secs(config.cleanup.interval_secs),
        config.cleanup.pending_deadline_hours,
        Duration::from_secs(config.session.ttl_secs),
    ));
    let _sweeper_handle = sweeper.start();

    let upload_service = UploadService::new(
        sessions,
        chunk_store.clone(),
        media_repo.clone(),
        Arc::new(queue_repo.clone()),
        Duration::from_secs(config.session.ttl_secs),
    );

    let state = Arc::new(AppState {
        upload_service,
        media_lifecycle: MediaLifecycleService::new(media_repo),
        progress_hub,
        auth_keys: AuthKeys::new(&config.jwt_secret),
        config: config.clone(),
    });

    let router = setup::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Medley listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for pool in &worker_pools {
        pool.shutdown().await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
