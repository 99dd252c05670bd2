//! Codec selection and ffmpeg argument construction.
//!
//! Everything here is pure so it can be tested without ffmpeg.

use std::fmt;

use subembed_core::config::DefaultSubtitle;
use subembed_core::{Container, Error, Result, SubtitleFormat};

use super::MuxRequest;

/// Codec a new subtitle stream is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleCodec {
    /// Stream-copy the input as is.
    Copy,
    Subrip,
    WebVtt,
    MovText,
}

impl SubtitleCodec {
    /// ffmpeg encoder name.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Subrip => "srt",
            Self::WebVtt => "webvtt",
            Self::MovText => "mov_text",
        }
    }
}

impl fmt::Display for SubtitleCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// Pick the codec for a subtitle `format` going into `container`.
///
/// | container   | srt      | ass/ssa  | vtt      | sub      |
/// |-------------|----------|----------|----------|----------|
/// | mkv         | copy     | copy     | copy     | srt      |
/// | webm        | webvtt   | webvtt   | copy     | webvtt   |
/// | mp4/m4v/mov | mov_text | mov_text | mov_text | mov_text |
///
/// AVI, FLV, WMV and MPEG-TS cannot carry text subtitles and fail with
/// [`Error::Mux`].
pub fn plan_subtitle_codec(container: Container, format: SubtitleFormat) -> Result<SubtitleCodec> {
    use SubtitleFormat::*;
    match container {
        Container::Mkv => Ok(match format {
            MicroDvd => SubtitleCodec::Subrip,
            Srt | Ass | Ssa | Vtt => SubtitleCodec::Copy,
        }),
        Container::Webm => Ok(match format {
            Vtt => SubtitleCodec::Copy,
            Srt | Ass | Ssa | MicroDvd => SubtitleCodec::WebVtt,
        }),
        Container::Mp4 | Container::Mov => Ok(SubtitleCodec::MovText),
        Container::Avi | Container::Flv | Container::Wmv | Container::Ts => Err(Error::mux(
            format!("{container} cannot carry subtitle streams ({format})"),
        )),
    }
}

/// Check every input against the container before anything is spawned.
pub fn plan_codecs(request: &MuxRequest) -> Result<Vec<SubtitleCodec>> {
    if request.subtitles.is_empty() {
        return Err(Error::input("at least one subtitle is required"));
    }
    request
        .subtitles
        .iter()
        .map(|s| plan_subtitle_codec(request.container, s.format))
        .collect()
}

/// Build the ffmpeg argument list for `request`.
///
/// Input 0 is the video; every stream of it is copied together with its
/// metadata and chapters. Inputs 1..=N are the subtitles, which become output
/// subtitle streams `existing..existing+N` in order.
pub fn build_ffmpeg_args(request: &MuxRequest) -> Result<Vec<String>> {
    let codecs = plan_codecs(request)?;
    let existing = request.source.subtitle_streams;

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-v".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        path_arg(&request.video),
    ];
    for sub in &request.subtitles {
        args.push("-i".into());
        args.push(path_arg(&sub.path));
    }

    args.extend(["-map".into(), "0".into()]);
    if drops_data_streams(request) {
        args.extend(["-map".into(), "-0:d".into()]);
    }
    for input in 1..=request.subtitles.len() {
        args.extend(["-map".into(), input.to_string()]);
    }
    args.extend([
        "-map_metadata".into(),
        "0".into(),
        "-map_chapters".into(),
        "0".into(),
        "-c".into(),
        "copy".into(),
    ]);

    let first_is_default = request.default_subtitle == DefaultSubtitle::First
        && !request.source.has_default_subtitle;

    for (i, (sub, codec)) in request.subtitles.iter().zip(&codecs).enumerate() {
        let stream = existing + i;
        args.push(format!("-c:s:{stream}"));
        args.push(codec.ffmpeg_name().into());
        args.push(format!("-metadata:s:s:{stream}"));
        args.push(format!("language={}", sub.language));
        args.push(format!("-metadata:s:s:{stream}"));
        args.push(format!("title={}", sub.title));
        args.push(format!("-disposition:s:{stream}"));
        args.push(if i == 0 && first_is_default { "default" } else { "0" }.into());
    }

    if request.container.is_mp4_family() {
        args.extend(["-movflags".into(), "+faststart".into()]);
    }

    args.push(path_arg(&request.output));
    Ok(args)
}

/// Whether the source's data streams (timecode, GPS and similar) are left
/// out. The MP4 family cannot stream-copy them.
pub fn drops_data_streams(request: &MuxRequest) -> bool {
    request.container.is_mp4_family() && request.source.data_streams > 0
}

fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
