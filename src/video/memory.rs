//! In-memory media backend.
//!
//! Clips are described by duration and audio presence instead of being
//! decoded. Rendered pictures are tracked as `(source, source time)`
//! references and audio as sample references, which is enough to check
//! exactly which source feeds every instant of the output. Every open and
//! close is counted so handle lifetimes can be asserted on.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{CompositorError, Result};
use crate::video::backend::MediaBackend;

const SPAN_TOLERANCE: f64 = 1e-9;

/// Description of a fake media file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySource {
    pub duration: f64,
    pub has_audio: bool,
}

#[derive(Debug)]
pub struct MemoryClip {
    id: u64,
    path: PathBuf,
    source: MemorySource,
}

/// A window `[start, end)` of one source's picture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpan {
    pub source: PathBuf,
    pub start: f64,
    pub end: f64,
}

impl FrameSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryVideo {
    pub spans: Vec<FrameSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAudio {
    pub source: PathBuf,
    pub duration: f64,
}

/// What a render produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryOutput {
    pub video: Vec<FrameSpan>,
    pub audio: Option<MemoryAudio>,
    pub duration: f64,
}

/// Reference to a single source picture or sample
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRef {
    pub source: PathBuf,
    pub time: f64,
}

impl MemoryOutput {
    pub fn video_duration(&self) -> f64 {
        self.video.iter().map(FrameSpan::duration).sum()
    }

    /// Which source picture is shown at output time `t`
    pub fn frame_at(&self, t: f64) -> Option<SourceRef> {
        let mut offset = 0.0;
        for span in &self.video {
            let length = span.duration();
            if t >= offset && t < offset + length {
                return Some(SourceRef {
                    source: span.source.clone(),
                    time: span.start + (t - offset),
                });
            }
            offset += length;
        }
        None
    }

    /// Which source sample is heard at output time `t`
    pub fn audio_at(&self, t: f64) -> Option<SourceRef> {
        let audio = self.audio.as_ref()?;
        (t >= 0.0 && t < audio.duration).then(|| SourceRef {
            source: audio.source.clone(),
            time: t,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    open: HashSet<u64>,
    opened: usize,
    closed: usize,
    written: Vec<(PathBuf, MemoryOutput)>,
}

/// Media backend that never touches a codec
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sources: HashMap<PathBuf, MemorySource>,
    state: Mutex<MemoryState>,
    fail_writes: bool,
    fail_close: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decodable source. Unregistered paths fail to decode.
    pub fn with_source<P: Into<PathBuf>>(mut self, path: P, duration: f64, has_audio: bool) -> Self {
        self.sources.insert(path.into(), MemorySource { duration, has_audio });
        self
    }

    /// Make every `write` fail as if the disk were full
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Make every `close` report an error (the clip is still released)
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Number of clips currently open
    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    /// Total number of successful opens
    pub fn opened_total(&self) -> usize {
        self.lock().opened
    }

    /// Total number of closes
    pub fn closed_total(&self) -> usize {
        self.lock().closed
    }

    /// Everything written so far, in order
    pub fn written(&self) -> Vec<(PathBuf, MemoryOutput)> {
        self.lock().written.clone()
    }

    pub fn last_output(&self) -> Option<MemoryOutput> {
        self.lock().written.last().map(|(_, output)| output.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the counters from the next assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MediaBackend for MemoryBackend {
    type Clip = MemoryClip;
    type Video = MemoryVideo;
    type Audio = MemoryAudio;
    type Output = MemoryOutput;

    fn open(&self, path: &Path) -> Result<MemoryClip> {
        let source = self.sources.get(path).copied().ok_or_else(|| CompositorError::Decode {
            path: path.display().to_string(),
            reason: "not a registered media source".to_string(),
        })?;

        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.open.insert(id);
        state.opened += 1;

        Ok(MemoryClip {
            id,
            path: path.to_path_buf(),
            source,
        })
    }

    fn duration(&self, clip: &MemoryClip) -> f64 {
        clip.source.duration
    }

    fn has_audio(&self, clip: &MemoryClip) -> bool {
        clip.source.has_audio
    }

    fn subclip(&self, clip: &MemoryClip, start: f64, end: f64) -> Result<MemoryVideo> {
        if start < 0.0 || end <= start || end > clip.source.duration + SPAN_TOLERANCE {
            return Err(CompositorError::Decode {
                path: clip.path.display().to_string(),
                reason: format!(
                    "span {:.3}-{:.3}s outside clip of {:.3}s",
                    start, end, clip.source.duration
                ),
            });
        }

        Ok(MemoryVideo {
            spans: vec![FrameSpan {
                source: clip.path.clone(),
                start,
                end,
            }],
        })
    }

    fn audio(&self, clip: &MemoryClip) -> Result<Option<MemoryAudio>> {
        Ok(clip.source.has_audio.then(|| MemoryAudio {
            source: clip.path.clone(),
            duration: clip.source.duration,
        }))
    }

    fn concatenate(&self, tracks: Vec<MemoryVideo>) -> Result<MemoryVideo> {
        Ok(MemoryVideo {
            spans: tracks.into_iter().flat_map(|track| track.spans).collect(),
        })
    }

    fn with_audio(
        &self,
        video: MemoryVideo,
        audio: Option<MemoryAudio>,
        duration: f64,
    ) -> Result<MemoryOutput> {
        // Trim only; a shorter audio track is padded with silence by leaving it short
        let audio = audio.map(|audio| MemoryAudio {
            duration: audio.duration.min(duration),
            ..audio
        });

        Ok(MemoryOutput {
            video: video.spans,
            audio,
            duration,
        })
    }

    fn write(&self, output: &MemoryOutput, path: &Path) -> Result<()> {
        let write_error = |reason: String| CompositorError::Write {
            path: path.display().to_string(),
            reason,
        };

        if self.fail_writes {
            return Err(write_error("No space left on device".to_string()));
        }

        let manifest = serde_json::to_string_pretty(output).map_err(|e| write_error(e.to_string()))?;
        std::fs::write(path, manifest).map_err(|e| write_error(e.to_string()))?;

        self.lock().written.push((path.to_path_buf(), output.clone()));
        Ok(())
    }

    fn close(&self, clip: MemoryClip) -> Result<()> {
        let mut state = self.lock();
        if !state.open.remove(&clip.id) {
            return Err(CompositorError::Decode {
                path: clip.path.display().to_string(),
                reason: "clip closed twice".to_string(),
            });
        }
        state.closed += 1;

        if self.fail_close {
            return Err(CompositorError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "decoder refused to shut down",
            )));
        }
        Ok(())
    }
}
