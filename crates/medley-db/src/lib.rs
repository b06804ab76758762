//! Persistence layer: the media file metadata store and the durable
//! dispatch queue, both Postgres-backed through sqlx.
//!
//! The narrow traits in [`traits`] are what the upload service and the
//! worker consume; the repositories here are their production
//! implementations.

mod media;
mod queue;
pub mod traits;

pub use media::MediaFileRepository;
pub use queue::{DispatchDelivery, DispatchQueueRepository};
pub use traits::{MediaFileStore, WorkDispatcher};

use sqlx::PgPool;

/// Run embedded SQL migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
