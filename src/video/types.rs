use serde::{Deserialize, Serialize};

/// Default length of an inserted clip in seconds
pub const DEFAULT_INSERT_DURATION: f64 = 3.0;

/// A request to show an insert clip's picture at a point of the main video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    /// Path (or `file://` URL) of the clip to insert
    pub source: String,

    /// Position on the main video's timeline, in seconds
    pub timestamp: f64,

    /// How long the insert should be shown, in seconds
    pub duration: f64,
}

impl InsertRequest {
    /// Create a request with the default insert duration
    pub fn new<S: Into<String>>(source: S, timestamp: f64) -> Self {
        Self::with_duration(source, timestamp, DEFAULT_INSERT_DURATION)
    }

    pub fn with_duration<S: Into<String>>(source: S, timestamp: f64, duration: f64) -> Self {
        Self {
            source: source.into(),
            timestamp,
            duration,
        }
    }

    /// Parse the CLI form `path@seconds`.
    ///
    /// The last `@` separates the timestamp so paths may contain `@` themselves.
    pub fn parse(spec: &str, duration: f64) -> Option<Self> {
        let (source, timestamp) = spec.rsplit_once('@')?;
        if source.is_empty() {
            return None;
        }
        let timestamp = timestamp.trim().parse().ok()?;
        Some(Self::with_duration(source, timestamp, duration))
    }
}

/// Video encoding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoParams {
    /// Force an output frame rate; the canvas source's rate is used otherwise
    pub fps: Option<f64>,

    /// Force an output resolution (width, height)
    pub resolution: Option<(u32, u32)>,

    /// Video codec to use for output
    pub codec: String,

    /// Audio codec to use for output
    pub audio_codec: String,

    /// Encoder preset
    pub preset: String,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            fps: None,
            resolution: None,
            codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "medium".to_string(),
            quality: 85,
        }
    }
}

impl VideoParams {
    /// Map the 0-100 quality scale onto x264's CRF range
    pub fn crf(&self) -> u8 {
        (51 - ((self.quality.min(100) as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
    }
}

/// Frame geometry every rendered segment gets scaled to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Canvas {
    /// Apply any forced values from the encoding parameters
    pub fn overridden_by(self, params: &VideoParams) -> Self {
        let (width, height) = params.resolution.unwrap_or((self.width, self.height));
        Self {
            width,
            height,
            fps: params.fps.unwrap_or(self.fps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insert_spec() {
        let request = InsertRequest::parse("clips/a.mp4@5.5", 3.0).unwrap();
        assert_eq!(request.source, "clips/a.mp4");
        assert_eq!(request.timestamp, 5.5);
        assert_eq!(request.duration, 3.0);

        let request = InsertRequest::parse("me@host/b.mp4@10", 2.0).unwrap();
        assert_eq!(request.source, "me@host/b.mp4");
        assert_eq!(request.timestamp, 10.0);

        assert!(InsertRequest::parse("no-timestamp.mp4", 3.0).is_none());
        assert!(InsertRequest::parse("@4.0", 3.0).is_none());
        assert!(InsertRequest::parse("a.mp4@soon", 3.0).is_none());
    }

    #[test]
    fn test_quality_to_crf() {
        let mut params = VideoParams::default();
        params.quality = 100;
        assert_eq!(params.crf(), 0);
        params.quality = 0;
        assert_eq!(params.crf(), 51);
    }

    #[test]
    fn test_canvas_override() {
        let canvas = Canvas { width: 1280, height: 720, fps: 25.0 };
        assert_eq!(canvas.overridden_by(&VideoParams::default()), canvas);

        let params = VideoParams {
            resolution: Some((1920, 1080)),
            ..VideoParams::default()
        };
        let forced = canvas.overridden_by(&params);
        assert_eq!((forced.width, forced.height, forced.fps), (1920, 1080, 25.0));
    }
}
