// src/video/ffmpeg.rs - Media backend on top of the ffmpeg/ffprobe executables

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::EncodingConfig;
use crate::error::{CompositorError, Result};
use crate::video::backend::MediaBackend;
use crate::video::types::Canvas;

const FALLBACK_FPS: f64 = 30.0;

/// A probed media file
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedClip {
    pub path: PathBuf,
    pub duration: f64,
    pub has_audio: bool,
    pub canvas: Canvas,
}

/// `[start, end)` of one input's picture
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSpan {
    pub path: PathBuf,
    pub start: f64,
    pub end: f64,
    pub canvas: Canvas,
}

/// Video track as an ordered list of source spans, turned into a filter graph at write time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoGraph {
    pub spans: Vec<VideoSpan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub path: PathBuf,
    pub duration: f64,
}

/// Everything needed for one ffmpeg invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub video: VideoGraph,
    pub audio: Option<AudioSource>,
    pub duration: f64,
}

/// Media backend driving external ffmpeg commands
pub struct FfmpegBackend {
    config: EncodingConfig,
}

impl FfmpegBackend {
    pub fn new(config: EncodingConfig) -> Self {
        Self { config }
    }

    pub fn check_ffmpeg_available(&self) -> bool {
        Command::new(&self.config.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn run(&self, tool: &str, args: &[String]) -> Result<Output> {
        debug!("Running {} {}", tool, args.join(" "));
        Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CompositorError::BackendUnavailable {
                tool: tool.to_string(),
                reason: e.to_string(),
            })
    }

    /// Build the full ffmpeg argument list for a render
    pub fn build_args(&self, job: &RenderJob, output_path: &Path) -> Result<Vec<String>> {
        let params = &self.config.params;
        let first = job.video.spans.first().ok_or_else(|| CompositorError::Write {
            path: output_path.display().to_string(),
            reason: "no video segments to render".to_string(),
        })?;
        let canvas = first.canvas.overridden_by(params);

        // One input per distinct file, shared by all of its spans
        let mut inputs: Vec<&Path> = Vec::new();

        let mut filters = Vec::with_capacity(job.video.spans.len() + 2);
        for (i, span) in job.video.spans.iter().enumerate() {
            let idx = input_index(&mut inputs, &span.path);
            filters.push(format!(
                "[{idx}:v]trim=start={:.6}:end={:.6},setpts=PTS-STARTPTS,fps={},\
                 scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{i}]",
                span.start,
                span.end,
                canvas.fps,
                w = canvas.width,
                h = canvas.height,
            ));
        }

        let concat_inputs: String = (0..job.video.spans.len()).map(|i| format!("[v{i}]")).collect();
        filters.push(format!(
            "{concat_inputs}concat=n={}:v=1:a=0[outv]",
            job.video.spans.len()
        ));

        // Original audio untouched; padded with silence and cut by -t so it spans the output exactly
        let audio_input = job.audio.as_ref().map(|audio| {
            let idx = input_index(&mut inputs, &audio.path);
            filters.push(format!(
                "[{idx}:a]atrim=start=0:end={:.6},asetpts=PTS-STARTPTS,apad[outa]",
                audio.duration.min(job.duration)
            ));
            idx
        });

        let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];
        for path in &inputs {
            args.push("-i".into());
            args.push(path.display().to_string());
        }
        args.push("-filter_complex".into());
        args.push(filters.join(";"));
        args.extend(["-map".into(), "[outv]".into()]);

        if audio_input.is_some() {
            args.extend([
                "-map".into(),
                "[outa]".into(),
                "-c:a".into(),
                params.audio_codec.clone(),
            ]);
        } else {
            args.push("-an".into());
        }

        args.extend([
            "-c:v".into(),
            params.codec.clone(),
            "-preset".into(),
            params.preset.clone(),
            "-crf".into(),
            params.crf().to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-threads".into(),
            self.config.threads.to_string(),
            "-t".into(),
            format!("{:.6}", job.duration),
            output_path.display().to_string(),
        ]);

        Ok(args)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Interpret `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe(path: &Path, json: &str) -> Result<ProbedClip> {
    let decode_error = |reason: &str| CompositorError::Decode {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| decode_error(&format!("invalid ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| decode_error("no video stream"))?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| decode_error("unknown duration"))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(decode_error("unknown frame size")),
    };

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(FALLBACK_FPS);

    Ok(ProbedClip {
        path: path.to_path_buf(),
        duration,
        has_audio,
        canvas: Canvas { width, height, fps },
    })
}

fn input_index<'a>(inputs: &mut Vec<&'a Path>, path: &'a Path) -> usize {
    match inputs.iter().position(|p| *p == path) {
        Some(idx) => idx,
        None => {
            inputs.push(path);
            inputs.len() - 1
        }
    }
}

/// Parse rates like `30000/1001`; `0/0` means unknown
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/').unwrap_or((rate, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

impl MediaBackend for FfmpegBackend {
    type Clip = ProbedClip;
    type Video = VideoGraph;
    type Audio = AudioSource;
    type Output = RenderJob;

    fn open(&self, path: &Path) -> Result<ProbedClip> {
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            path.display().to_string(),
        ];
        let output = self.run(&self.config.ffprobe, &args)?;

        if !output.status.success() {
            return Err(CompositorError::Decode {
                path: path.display().to_string(),
                reason: stderr_tail(&output),
            });
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let clip = parse_probe(path, &json)?;

        info!("Video metadata: {}x{} @ {:.2}fps, {:.3}s, audio: {}",
              clip.canvas.width, clip.canvas.height, clip.canvas.fps, clip.duration, clip.has_audio);

        Ok(clip)
    }

    fn duration(&self, clip: &ProbedClip) -> f64 {
        clip.duration
    }

    fn has_audio(&self, clip: &ProbedClip) -> bool {
        clip.has_audio
    }

    fn subclip(&self, clip: &ProbedClip, start: f64, end: f64) -> Result<VideoGraph> {
        Ok(VideoGraph {
            spans: vec![VideoSpan {
                path: clip.path.clone(),
                start,
                end,
                canvas: clip.canvas,
            }],
        })
    }

    fn audio(&self, clip: &ProbedClip) -> Result<Option<AudioSource>> {
        Ok(clip.has_audio.then(|| AudioSource {
            path: clip.path.clone(),
            duration: clip.duration,
        }))
    }

    fn concatenate(&self, tracks: Vec<VideoGraph>) -> Result<VideoGraph> {
        Ok(VideoGraph {
            spans: tracks.into_iter().flat_map(|t| t.spans).collect(),
        })
    }

    fn with_audio(
        &self,
        video: VideoGraph,
        audio: Option<AudioSource>,
        duration: f64,
    ) -> Result<RenderJob> {
        Ok(RenderJob { video, audio, duration })
    }

    fn write(&self, job: &RenderJob, path: &Path) -> Result<()> {
        let args = self.build_args(job, path)?;
        info!("Encoding {} segments to {:?}", job.video.spans.len(), path);

        let output = self.run(&self.config.ffmpeg, &args)?;
        if !output.status.success() {
            return Err(CompositorError::Write {
                path: path.display().to_string(),
                reason: format!("FFmpeg failed: {}", stderr_tail(&output)),
            });
        }

        Ok(())
    }

    fn close(&self, _clip: ProbedClip) -> Result<()> {
        // Each ffmpeg/ffprobe run opens and closes its own files
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "width": 1280, "height": 720,
             "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001", "duration": "20.020000"},
            {"index": 1, "codec_type": "audio", "sample_rate": "48000"}
        ],
        "format": {"duration": "20.000000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}
    }"#;

    fn canvas() -> Canvas {
        Canvas { width: 1280, height: 720, fps: 25.0 }
    }

    fn span(path: &str, start: f64, end: f64) -> VideoSpan {
        VideoSpan { path: PathBuf::from(path), start, end, canvas: canvas() }
    }

    #[test]
    fn test_parse_probe() {
        let clip = parse_probe(Path::new("/v/main.mp4"), PROBE_JSON).unwrap();
        assert_eq!(clip.duration, 20.0);
        assert!(clip.has_audio);
        assert_eq!((clip.canvas.width, clip.canvas.height), (1280, 720));
        assert!((clip.canvas.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_without_video_is_decode_error() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        let err = parse_probe(Path::new("/v/song.m4a"), json).unwrap_err();
        assert!(matches!(err, CompositorError::Decode { .. }));

        let err = parse_probe(Path::new("/v/garbage.mp4"), "not json").unwrap_err();
        assert!(matches!(err, CompositorError::Decode { .. }));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("0/0"), None);
    }

    #[test]
    fn test_build_args_shares_inputs_and_keeps_main_audio() {
        let backend = FfmpegBackend::new(EncodingConfig::default());
        let job = RenderJob {
            video: VideoGraph {
                spans: vec![
                    span("/v/main.mp4", 0.0, 5.0),
                    span("/v/a.mp4", 0.0, 3.0),
                    span("/v/main.mp4", 8.0, 20.0),
                ],
            },
            audio: Some(AudioSource { path: PathBuf::from("/v/main.mp4"), duration: 20.0 }),
            duration: 20.0,
        };

        let args = backend.build_args(&job, Path::new("/out/final.mp4")).unwrap();
        let inputs: Vec<&String> = args
            .iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| *flag == "-i")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(inputs, vec!["/v/main.mp4", "/v/a.mp4"]);

        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.contains("[0:v]trim=start=0.000000:end=5.000000"));
        assert!(graph.contains("[1:v]trim=start=0.000000:end=3.000000"));
        assert!(graph.contains("[0:v]trim=start=8.000000:end=20.000000"));
        assert!(graph.contains("[v0][v1][v2]concat=n=3:v=1:a=0[outv]"));
        assert!(graph.contains("[0:a]atrim=start=0:end=20.000000,asetpts=PTS-STARTPTS,apad[outa]"));

        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "20.000000"));
        assert_eq!(args.last().unwrap(), "/out/final.mp4");
    }

    #[test]
    fn test_build_args_without_audio() {
        let backend = FfmpegBackend::new(EncodingConfig::default());
        let job = RenderJob {
            video: VideoGraph { spans: vec![span("/v/silent.mp4", 0.0, 4.0)] },
            audio: None,
            duration: 4.0,
        };

        let args = backend.build_args(&job, Path::new("out.mp4")).unwrap();
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.iter().any(|a| a.contains("[outa]")));
    }

    #[test]
    fn test_build_args_rejects_empty_graph() {
        let backend = FfmpegBackend::new(EncodingConfig::default());
        let job = RenderJob { video: VideoGraph::default(), audio: None, duration: 1.0 };
        assert!(matches!(
            backend.build_args(&job, Path::new("out.mp4")),
            Err(CompositorError::Write { .. })
        ));
    }
}
