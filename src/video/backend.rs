use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// Capability interface to whatever decodes, cuts and encodes media.
///
/// The compositor only ever talks to this trait, so its planning logic can be
/// exercised against an in-memory implementation without codec machinery.
pub trait MediaBackend {
    /// An opened, decodable media source
    type Clip;

    /// A video-only track (one or more spans of source pictures)
    type Video;

    /// An audio track
    type Audio;

    /// A video track with its audio attached, ready to be written
    type Output;

    /// Open a media file. Fails with `Decode` when it is not valid media.
    fn open(&self, path: &Path) -> Result<Self::Clip>;

    /// Duration of a clip in seconds
    fn duration(&self, clip: &Self::Clip) -> f64;

    /// Whether the clip carries an audio stream
    fn has_audio(&self, clip: &Self::Clip) -> bool;

    /// The picture of `[start, end)` of the clip's own timeline
    fn subclip(&self, clip: &Self::Clip, start: f64, end: f64) -> Result<Self::Video>;

    /// The clip's audio over its full duration, if it has any
    fn audio(&self, clip: &Self::Clip) -> Result<Option<Self::Audio>>;

    /// Join video tracks end to end, in order
    fn concatenate(&self, tracks: Vec<Self::Video>) -> Result<Self::Video>;

    /// Attach an audio track, aligned to exactly `duration` seconds
    fn with_audio(
        &self,
        video: Self::Video,
        audio: Option<Self::Audio>,
        duration: f64,
    ) -> Result<Self::Output>;

    /// Encode the result to `path`
    fn write(&self, output: &Self::Output, path: &Path) -> Result<()>;

    /// Release a clip's decoder resources
    fn close(&self, clip: Self::Clip) -> Result<()>;
}

/// Scoped ownership of an opened clip.
///
/// The clip is closed exactly once when the handle goes out of scope, whether
/// the surrounding operation succeeded or bailed out with `?`. A failing close
/// is logged and never replaces the error already travelling up the stack.
pub struct ClipHandle<'a, B: MediaBackend> {
    backend: &'a B,
    clip: ManuallyDrop<B::Clip>,
    path: PathBuf,
    duration: f64,
    has_audio: bool,
}

impl<'a, B: MediaBackend> ClipHandle<'a, B> {
    /// Open `path` through `backend`
    pub fn open(backend: &'a B, path: &Path) -> Result<Self> {
        let clip = backend.open(path)?;
        let duration = backend.duration(&clip);
        let has_audio = backend.has_audio(&clip);

        debug!("Opened {:?} ({:.3}s, audio: {})", path, duration, has_audio);

        Ok(Self {
            backend,
            clip: ManuallyDrop::new(clip),
            path: path.to_path_buf(),
            duration,
            has_audio,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    /// Borrow the backend clip.
    pub fn clip(&self) -> &B::Clip {
        &self.clip
    }
}

impl<B: MediaBackend> Drop for ClipHandle<'_, B> {
    fn drop(&mut self) {
        // SAFETY: `clip` is taken exactly once, here, and never touched again.
        let clip = unsafe { ManuallyDrop::take(&mut self.clip) };
        match self.backend.close(clip) {
            Ok(()) => debug!("Released {:?}", self.path),
            Err(e) => warn!("Failed to release {:?}: {}", self.path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::memory::MemoryBackend;

    #[test]
    fn test_handle_closes_clip_exactly_once() {
        let backend = MemoryBackend::new().with_source("/v/main.mp4", 12.0, true);

        {
            let handle = ClipHandle::open(&backend, Path::new("/v/main.mp4")).unwrap();
            assert_eq!(handle.duration(), 12.0);
            assert_eq!(backend.duration(handle.clip()), 12.0);
            assert!(backend.has_audio(handle.clip()));
            assert_eq!(backend.open_count(), 1);
        }

        assert_eq!(backend.open_count(), 0);
        assert_eq!(backend.closed_total(), 1);
    }

    #[test]
    fn test_failed_open_leaves_nothing_to_close() {
        let backend = MemoryBackend::new();

        assert!(ClipHandle::open(&backend, Path::new("/v/missing.mp4")).is_err());
        assert_eq!(backend.opened_total(), 0);
        assert_eq!(backend.closed_total(), 0);
    }

    #[test]
    fn test_close_failure_is_swallowed_on_drop() {
        let backend = MemoryBackend::new().with_source("/v/a.mp4", 3.0, false).failing_close();

        drop(ClipHandle::open(&backend, Path::new("/v/a.mp4")).unwrap());
        assert_eq!(backend.open_count(), 0);
    }
}
