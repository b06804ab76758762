pub mod media;
pub mod session;
pub mod work_item;

pub use media::{MediaFile, MediaFileStatus, MediaKind, OwnerKind};
pub use session::UploadSession;
pub use work_item::WorkItem;
