//! External transcoder boundary.
//!
//! The [`Transcoder`] trait hides the actual encoder; [`FfmpegTranscoder`]
//! shells out to ffmpeg. Images are re-encoded to webp; videos are
//! re-encoded to H.264 and get a webp thumbnail extracted from an early
//! frame. A non-zero exit status is a terminal [`AppError::Transcode`].

mod transcoder;

pub use transcoder::{FfmpegTranscoder, ImageOutput, Transcoder, VideoOutput};
