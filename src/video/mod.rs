//! # Video Module
//!
//! Clip-facing types and the media backend seam the compositor is built on.

pub mod backend;
pub mod ffmpeg;
pub mod memory;
pub mod types;

pub use backend::{ClipHandle, MediaBackend};
pub use ffmpeg::FfmpegBackend;
pub use memory::MemoryBackend;
pub use types::{Canvas, InsertRequest, VideoParams, DEFAULT_INSERT_DURATION};
