//! Application state shared by all handlers.

use medley_core::Config;

use crate::auth::AuthKeys;
use crate::progress::ProgressHub;
use crate::services::{MediaLifecycleService, UploadService};

pub struct AppState {
    pub upload_service: UploadService,
    pub media_lifecycle: MediaLifecycleService,
    pub progress_hub: ProgressHub,
    pub auth_keys: AuthKeys,
    pub config: Config,
}
