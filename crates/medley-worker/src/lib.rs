//! Background side of the pipeline: per-kind dispatch queue consumers that
//! reassemble, transcode and advance the media file state machine, plus the
//! periodic orphan cleanup sweeper.

mod sweeper;
mod worker;

pub use sweeper::CleanupSweeper;
pub use worker::{
    process_delivery, start_stale_requeue, DispatchWorkerPool, WorkerContext,
};
