//! Segment planning.
//!
//! Turns a main video duration plus a set of timed inserts into an ordered
//! list of segments that tile `[0, main_duration)` exactly, each one
//! attributed to either the main video or a single insert.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompositorError, Result};

/// Spans ending closer than this to the end of the main video end exactly on it
const END_TOLERANCE: f64 = 1e-9;

/// What to do when an insert starts before the previous one has ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// The later insert wins; the earlier one is cut off at its start
    #[default]
    Truncate,

    /// Overlapping inserts are an `InvalidTimestamp` error
    Reject,
}

/// An insert positioned on the main timeline, already clamped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Index of the insert (into the caller's list of opened clips)
    pub insert: usize,

    /// Start on the main timeline, in seconds
    pub timestamp: f64,

    /// Effective length in seconds
    pub duration: f64,
}

/// Which picture feeds a segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SegmentSource {
    /// The main video at the same timestamps
    Main,

    /// An insert clip, starting from its first frame
    Insert { insert: usize },
}

/// A contiguous span `[start, end)` of the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub source: SegmentSource,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The span of the source clip this segment shows
    pub fn source_range(&self) -> (f64, f64) {
        match self.source {
            SegmentSource::Main => (self.start, self.end),
            SegmentSource::Insert { .. } => (0.0, self.duration()),
        }
    }
}

/// Ordered segments covering the whole main timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertionPlan {
    pub main_duration: f64,
    pub segments: Vec<Segment>,
}

impl InsertionPlan {
    /// Build the plan for inserts sorted by ascending timestamp
    pub fn build(main_duration: f64, placements: &[Placement], policy: OverlapPolicy) -> Result<Self> {
        let mut segments: Vec<Segment> = Vec::with_capacity(placements.len() * 2 + 1);
        let mut pos = 0.0;

        for placement in placements {
            let start = placement.timestamp;
            let mut end = (start + placement.duration).min(main_duration);
            if main_duration - end <= END_TOLERANCE {
                end = main_duration;
            }

            if !(start >= 0.0 && start < main_duration) || end <= start {
                return Err(CompositorError::invalid_timestamp(
                    start,
                    format!("insert does not fit inside the main video ({:.3}s)", main_duration),
                ));
            }

            if start > pos {
                segments.push(Segment { start: pos, end: start, source: SegmentSource::Main });
            } else if start < pos {
                match policy {
                    OverlapPolicy::Reject => {
                        return Err(CompositorError::invalid_timestamp(
                            start,
                            format!("overlaps the previous insert, which runs until {:.3}s", pos),
                        ));
                    }
                    OverlapPolicy::Truncate => truncate_previous(&mut segments, start),
                }
            }

            segments.push(Segment {
                start,
                end,
                source: SegmentSource::Insert { insert: placement.insert },
            });
            pos = end;
        }

        if main_duration - pos > END_TOLERANCE {
            segments.push(Segment { start: pos, end: main_duration, source: SegmentSource::Main });
        }

        let plan = Self { main_duration, segments };
        debug!("Planned {} segments over {:.3}s", plan.segments.len(), main_duration);
        Ok(plan)
    }

    /// Check the plan tiles `[0, main_duration)` without gaps or overlaps
    pub fn validate(&self) -> bool {
        let Some(first) = self.segments.first() else {
            return self.main_duration == 0.0;
        };
        let last = self.segments[self.segments.len() - 1];

        first.start == 0.0
            && last.end == self.main_duration
            && self.segments.iter().all(|s| s.end > s.start)
            && self.segments.windows(2).all(|w| w[0].end == w[1].start)
    }

    /// Which source (and source-local time) is shown at output time `t`
    pub fn source_at(&self, t: f64) -> Option<(SegmentSource, f64)> {
        self.segments
            .iter()
            .find(|s| t >= s.start && t < s.end)
            .map(|s| (s.source, s.source_range().0 + (t - s.start)))
    }

    /// Number of segments showing an insert
    pub fn insert_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s.source, SegmentSource::Insert { .. }))
            .count()
    }
}

/// Cut the insert that was emitted last so it ends at `at`.
///
/// Inputs are sorted, so only the most recent insert can reach past `at`.
/// An insert cut down to nothing is removed.
fn truncate_previous(segments: &mut Vec<Segment>, at: f64) {
    if let Some(previous) = segments.last_mut() {
        debug!("Truncating insert {:.3}-{:.3}s at {:.3}s", previous.start, previous.end, at);
        previous.end = at;
        if previous.end <= previous.start {
            segments.pop();
        }
    }
}
