//! # Insert-Compositor
//!
//! Replace the picture of a video with short insert clips at chosen
//! timestamps. The output keeps the main video's duration and its audio
//! track, untouched.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use insert_compositor::{Compositor, Config, FfmpegBackend};
//!
//! # fn main() -> insert_compositor::Result<()> {
//! let config = Config::default();
//! let compositor = Compositor::new(FfmpegBackend::new(config.encoding))
//!     .with_overlap_policy(config.insert.overlap);
//!
//! compositor.insert_multiple_videos(
//!     "file:///videos/main.mp4",
//!     &[("broll/city.mp4", 5.0), ("broll/beach.mp4", 12.5)],
//!     "output.mp4",
//!     3.0,
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`composition`] - segment planning and the [`Compositor`]
//! - [`video`] - the [`MediaBackend`](video::MediaBackend) seam, the ffmpeg
//!   backend and an in-memory backend for tests
//! - [`config`] - configuration management
//! - [`paths`] - `file://` URL handling
//!
//! ## Custom Backends
//!
//! Anything that can open, cut, join and encode media can drive the
//! compositor by implementing [`MediaBackend`](video::MediaBackend).

pub mod composition;
pub mod config;
pub mod error;
pub mod paths;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{Compositor, InsertionPlan, OverlapPolicy},
    config::Config,
    error::{CompositorError, Result},
    video::{FfmpegBackend, InsertRequest, MediaBackend},
};
