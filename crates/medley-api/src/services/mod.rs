pub mod media_lifecycle;
pub mod upload;

pub use media_lifecycle::MediaLifecycleService;
pub use upload::UploadService;
