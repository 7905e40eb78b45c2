//! Where frames go
//!
//! A [`VideoSink`] is opened once with [`StreamParams`], receives frames in order,
//! and is then either closed (which writes the trailer) or aborted.

use crate::error::{CatResult, Error};
use imgref::ImgRef;
use rgb::RGB8;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Compression used for the video track
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Codec {
    /// Uncompressed YUV4MPEG2
    Raw,
    /// Motion JPEG
    Mjpeg,
    H264,
    /// MPEG-4 part 2
    Mpeg4,
}

impl Codec {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Mjpeg => "mjpeg",
            Self::H264 => "h264",
            Self::Mpeg4 => "mpeg4",
        }
    }

    /// `raw` for `.y4m` files, H.264 for everything else
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        if is_y4m_path(path) { Self::Raw } else { Self::H264 }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "raw" | "y4m" => Self::Raw,
            "mjpeg" | "mjpg" => Self::Mjpeg,
            "h264" | "avc" => Self::H264,
            "mpeg4" | "mp4v" => Self::Mpeg4,
            _ => return Err(Error::Validation(format!("Unknown codec \"{s}\"; use h264, mjpeg, mpeg4 or raw"))),
        })
    }
}

/// What a sink is opened with
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub width: usize,
    pub height: usize,
    /// Frames per second
    pub fps: u32,
    pub codec: Codec,
}

/// Ordered, append-only destination for frames.
///
/// After a successful `open()` the owner must call exactly one of `close()` or `abort()`.
pub trait VideoSink {
    fn open(&mut self, path: &Path, params: &StreamParams) -> CatResult<()>;

    /// Frames must have exactly the size the sink was opened with.
    fn append_frame(&mut self, frame: ImgRef<'_, RGB8>) -> CatResult<()>;

    /// Flushes and finalizes the file. Closing a closed sink does nothing.
    fn close(&mut self) -> CatResult<()>;

    /// Releases the file without finalizing it
    fn abort(&mut self);

    /// Bytes written to the output so far, if the backend knows
    fn written_bytes(&self) -> Option<u64> {
        None
    }
}

impl<S: VideoSink + ?Sized> VideoSink for Box<S> {
    fn open(&mut self, path: &Path, params: &StreamParams) -> CatResult<()> {
        (**self).open(path, params)
    }
    fn append_frame(&mut self, frame: ImgRef<'_, RGB8>) -> CatResult<()> {
        (**self).append_frame(frame)
    }
    fn close(&mut self) -> CatResult<()> {
        (**self).close()
    }
    fn abort(&mut self) {
        (**self).abort()
    }
    fn written_bytes(&self) -> Option<u64> {
        (**self).written_bytes()
    }
}

pub(crate) fn check_frame_size(frame: ImgRef<'_, RGB8>, width: usize, height: usize) -> CatResult<()> {
    if frame.width() != width || frame.height() != height {
        return Err(Error::WrongSize(format!("Frame has wrong size ({}×{}, expected {}×{})",
            frame.width(), frame.height(), width, height)));
    }
    Ok(())
}

#[must_use]
pub fn is_y4m_path(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("y4m"))
}

/// Picks the backend for the output file: `.y4m` files are written directly, everything else goes through ffmpeg.
pub fn sink_for_path(path: &Path, codec: Codec) -> CatResult<Box<dyn VideoSink>> {
    if is_y4m_path(path) {
        if codec != Codec::Raw {
            return Err(Error::Validation(format!("{codec} can't be stored in a .y4m file; use the raw codec")));
        }
        return Ok(Box::new(crate::encodey4m::Y4mSink::new()));
    }
    if codec == Codec::Raw {
        return Err(Error::validation("The raw codec needs an output file with the .y4m extension"));
    }
    get_video_sink()
}

#[cfg(feature = "video")]
fn get_video_sink() -> CatResult<Box<dyn VideoSink>> {
    Ok(Box::new(crate::encodeffmpeg::FfmpegSink::new()))
}

#[cfg(not(feature = "video"))]
#[cold]
fn get_video_sink() -> CatResult<Box<dyn VideoSink>> {
    Err(Error::VideoDisabled)
}
