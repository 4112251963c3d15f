use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{
    composition::plan::{InsertionPlan, OverlapPolicy, Placement, SegmentSource},
    error::{CompositorError, Result},
    paths::normalize_path,
    video::{ClipHandle, InsertRequest, MediaBackend},
};

/// Replaces the picture of a main video with insert clips at given timestamps.
///
/// Every call follows the same pipeline:
/// 1. Open the main video and read its duration
/// 2. Validate, sort and open every insert, clamping its span to fit
/// 3. Plan segments tiling the main timeline
/// 4. Cut and concatenate the pictures, reattach the main audio, write
///
/// All clip handles opened by a call are released before it returns, on
/// success and on every error path.
pub struct Compositor<B: MediaBackend> {
    backend: B,
    overlap: OverlapPolicy,
}

/// Clips opened for one call, plus the plan built from them
struct Prepared<'a, B: MediaBackend> {
    main: ClipHandle<'a, B>,
    inserts: Vec<ClipHandle<'a, B>>,
    plan: InsertionPlan,
}

impl<B: MediaBackend> Compositor<B> {
    /// Create a compositor using the default (truncating) overlap policy
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            overlap: OverlapPolicy::default(),
        }
    }

    pub fn with_overlap_policy(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.overlap
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Show `insert_path` instead of the main picture from `timestamp` for
    /// `insert_duration` seconds, keeping the main audio.
    ///
    /// Paths may be plain paths or `file://` URLs. Returns the output path.
    pub fn insert_video(
        &self,
        main_path: &str,
        insert_path: &str,
        timestamp: f64,
        output_path: &str,
        insert_duration: f64,
    ) -> Result<PathBuf> {
        self.insert_multiple_videos(main_path, &[(insert_path, timestamp)], output_path, insert_duration)
    }

    /// Insert several clips, given as `(path, timestamp)` pairs, each shown for
    /// `insert_duration` seconds.
    ///
    /// The same path may appear more than once. The first invalid pair aborts
    /// the whole call and nothing is written.
    pub fn insert_multiple_videos<S: AsRef<str>>(
        &self,
        main_path: &str,
        video_timestamps: &[(S, f64)],
        output_path: &str,
        insert_duration: f64,
    ) -> Result<PathBuf> {
        let requests: Vec<InsertRequest> = video_timestamps
            .iter()
            .map(|(path, timestamp)| InsertRequest::with_duration(path.as_ref(), *timestamp, insert_duration))
            .collect();

        self.insert_requests(main_path, &requests, output_path)
    }

    /// Like [`insert_multiple_videos`](Self::insert_multiple_videos), with a
    /// duration per request.
    pub fn insert_requests(
        &self,
        main_path: &str,
        requests: &[InsertRequest],
        output_path: &str,
    ) -> Result<PathBuf> {
        let output_path = normalize_path(output_path);

        info!("🎬 Inserting {} clip(s) into {}", requests.len(), main_path);
        info!("   Output: {:?}", output_path);

        // Every clip in `prepared` is closed when it goes out of scope
        let prepared = self.prepare(main_path, requests)?;
        self.render(&prepared, &output_path)?;

        info!("🎉 Insertion complete! Output saved to: {:?}", output_path);
        Ok(output_path)
    }

    /// Work out the segment plan without rendering anything
    pub fn plan(&self, main_path: &str, requests: &[InsertRequest]) -> Result<InsertionPlan> {
        let prepared = self.prepare(main_path, requests)?;
        Ok(prepared.plan)
    }

    fn prepare(&self, main_path: &str, requests: &[InsertRequest]) -> Result<Prepared<'_, B>> {
        // Nothing gets opened for a call that can never succeed
        if let Some(bad) = requests.iter().find(|r| !r.duration.is_finite() || r.duration <= 0.0) {
            return Err(CompositorError::InvalidDuration { duration: bad.duration });
        }

        let main_path = resolve_source(main_path)?;
        let main = ClipHandle::open(&self.backend, &main_path)?;
        let main_duration = main.duration();
        info!("   Main video: {:.3}s (audio: {})", main_duration, main.has_audio());

        // Stable: equal timestamps keep the caller's order
        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by(|&a, &b| requests[a].timestamp.total_cmp(&requests[b].timestamp));

        let mut inserts = Vec::with_capacity(requests.len());
        let mut placements = Vec::with_capacity(requests.len());

        for index in order {
            let request = &requests[index];
            let timestamp = request.timestamp;

            if !timestamp.is_finite() || timestamp < 0.0 {
                return Err(CompositorError::invalid_timestamp(timestamp, "must be zero or more seconds"));
            }
            if timestamp >= main_duration {
                return Err(CompositorError::invalid_timestamp(
                    timestamp,
                    format!("at or past the end of the main video ({:.3}s)", main_duration),
                ));
            }

            let path = resolve_source(&request.source)?;
            let insert = ClipHandle::open(&self.backend, &path)?;

            let duration = request
                .duration
                .min(insert.duration())
                .min(main_duration - timestamp);
            if duration <= 0.0 {
                return Err(CompositorError::invalid_timestamp(
                    timestamp,
                    format!("leaves no room for {:?}", path),
                ));
            }

            debug!("Insert #{} {:?}: {:.3}s for {:.3}s (requested {:.3}s)",
                   index, path, timestamp, duration, request.duration);

            placements.push(Placement {
                insert: inserts.len(),
                timestamp,
                duration,
            });
            inserts.push(insert);
        }

        let plan = InsertionPlan::build(main_duration, &placements, self.overlap)?;

        Ok(Prepared { main, inserts, plan })
    }

    fn render(&self, prepared: &Prepared<'_, B>, output_path: &Path) -> Result<()> {
        let plan = &prepared.plan;
        info!("   Rendering {} segments ({} inserted)", plan.segments.len(), plan.insert_segments());

        let mut tracks = Vec::with_capacity(plan.segments.len());
        for segment in &plan.segments {
            let handle = match segment.source {
                SegmentSource::Main => &prepared.main,
                SegmentSource::Insert { insert } => &prepared.inserts[insert],
            };
            let (start, end) = segment.source_range();

            debug!("   {:>8.3}s-{:<8.3}s <- {:?} [{:.3}s-{:.3}s]",
                   segment.start, segment.end, handle.path(), start, end);

            tracks.push(self.backend.subclip(handle.clip(), start, end)?);
        }

        let video = self.backend.concatenate(tracks)?;

        let audio = self.backend.audio(prepared.main.clip())?;
        if audio.is_none() {
            warn!("Main video {:?} has no audio track; output will be silent", prepared.main.path());
        }
        let combined = self.backend.with_audio(video, audio, plan.main_duration)?;

        // Encode next to the destination and move into place only once complete,
        // so a failed render never touches an existing file at `output_path`
        let staging = staging_path(output_path);
        if let Err(e) = self.backend.write(&combined, &staging) {
            remove_partial_output(&staging);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&staging, output_path) {
            remove_partial_output(&staging);
            return Err(CompositorError::Write {
                path: output_path.display().to_string(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }
}

/// Normalize a caller-supplied path and make sure it names an existing file
fn resolve_source(raw: &str) -> Result<PathBuf> {
    let path = normalize_path(raw);
    if !path.is_file() {
        return Err(CompositorError::SourceNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(path)
}

/// Hidden sibling of `output` that keeps its extension, so encoders can still
/// pick the container from it
fn staging_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.partial", stem),
    };
    output.with_file_name(name)
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove partial output {:?}: {}", path, e);
        }
    }
}
