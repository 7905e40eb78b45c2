/*
 folder2video: turns a folder of PNG frames into a video

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use imgref::*;
use log::{debug, info, warn};
use rgb::*;

mod error;
pub use crate::error::*;
pub mod decode;
pub use crate::decode::*;
pub mod frames;
pub use crate::frames::{FrameSequence, SortOrder};
pub mod progress;
use crate::progress::*;
pub mod sink;
pub use crate::sink::{sink_for_path, Codec, StreamParams, VideoSink};

mod encodey4m;
pub use crate::encodey4m::Y4mSink;
#[cfg(feature = "video")]
mod encodeffmpeg;
#[cfg(feature = "video")]
pub use crate::encodeffmpeg::FfmpegSink;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Size of the frames in the output video
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameSize {
    /// Every frame is scaled to exactly this size
    Fixed { width: usize, height: usize },
    /// The size of the first image is used, and other frames are scaled to match it
    FirstFrame,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Frames per second of the output
    pub fps: u32,
    /// `None` picks the codec from the output file's extension
    pub codec: Option<Codec>,
    pub frame_size: FrameSize,
    pub order: SortOrder,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps: 60,
            codec: None,
            frame_size: FrameSize::Fixed { width: 640, height: 480 },
            order: SortOrder::Lexicographic,
        }
    }
}

impl Settings {
    fn check(&self) -> CatResult<()> {
        if self.fps == 0 {
            return Err(Error::validation("Frame rate must be at least 1 fps"));
        }
        if let FrameSize::Fixed { width, height } = self.frame_size {
            if width == 0 || height == 0 {
                return Err(Error::Validation(format!("Frame size {width}×{height} is empty")));
            }
        }
        Ok(())
    }

    /// The configured codec, or the one that fits the extension of `output_file`
    #[must_use]
    pub fn codec_for(&self, output_file: &Path) -> Codec {
        self.codec.unwrap_or_else(|| Codec::for_path(output_file))
    }
}

/// Which folder to read, and where to write the video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input_folder: PathBuf,
    pub output_file: PathBuf,
}

impl ConversionRequest {
    pub fn new(input_folder: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            input_folder: input_folder.into(),
            output_file: output_file.into(),
        }
    }

    /// Checks the output path, and that the input folder exists. Doesn't list the folder.
    pub fn validate(&self) -> CatResult<()> {
        if self.output_file.as_os_str().is_empty() {
            return Err(Error::validation("Output file path must not be empty"));
        }
        if self.input_folder.as_os_str().is_empty() {
            return Err(Error::validation("Input folder path must not be empty"));
        }
        if !self.input_folder.is_dir() {
            let path = &self.input_folder;
            let mut msg = if path.exists() {
                format!("The input path is not a folder: \"{}\"", path.display())
            } else {
                format!("Unable to find the input folder: \"{}\"", path.display())
            };
            if path.is_relative() {
                if let Ok(cwd) = env::current_dir() {
                    msg += &format!(" (searched in \"{}\")", cwd.display());
                }
            }
            return Err(Error::Validation(msg));
        }
        Ok(())
    }
}

/// What a successful conversion produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Number of frames in the video
    pub frames: usize,
    /// `None` if there were no frames, and therefore no file was written
    pub output: Option<PathBuf>,
    pub width: usize,
    pub height: usize,
}

/// Decodes frames with `D` and writes them to `S`
pub struct Converter<D, S> {
    decoder: D,
    sink: S,
    settings: Settings,
}

impl<D: ImageDecoder, S: VideoSink> Converter<D, S> {
    pub fn new(decoder: D, sink: S, settings: Settings) -> Self {
        Self { decoder, sink, settings }
    }

    /// Validates the request, lists the folder and writes the video.
    pub fn convert(&mut self, request: &ConversionRequest, reporter: &mut dyn ProgressReporter) -> CatResult<Summary> {
        request.validate()?;
        self.settings.check()?;
        info!("Converting {} to {}", request.input_folder.display(), request.output_file.display());
        let frames = FrameSequence::scan(&request.input_folder, self.settings.order)?;
        self.write_sequence(&frames, &request.output_file, reporter)
    }

    /// Encodes already-listed frames, in the given order.
    ///
    /// An empty sequence is not an error: nothing is written and `Summary::output` is `None`.
    /// If anything fails after the output has been created, the partial file is deleted.
    pub fn write_sequence(&mut self, frames: &FrameSequence, output_file: &Path, reporter: &mut dyn ProgressReporter) -> CatResult<Summary> {
        self.settings.check()?;
        let Some(first_path) = frames.first() else {
            warn!("No *.png files found; {} was not written", output_file.display());
            return Ok(Summary { frames: 0, output: None, width: 0, height: 0 });
        };

        let first = self.decoder.decode(first_path)?;
        let (width, height) = match self.settings.frame_size {
            FrameSize::Fixed { width, height } => (width, height),
            FrameSize::FirstFrame => (first.width(), first.height()),
        };
        let params = StreamParams {
            width,
            height,
            fps: self.settings.fps,
            codec: self.settings.codec_for(output_file),
        };
        info!("{} frames, {}×{} @ {} fps, {}", frames.len(), width, height, params.fps, params.codec);

        // the sink may have created the file before failing
        if let Err(err) = self.sink.open(output_file, &params) {
            remove_incomplete(output_file);
            return Err(err);
        }
        let res = match self.append_all(frames, first, &params, reporter) {
            Ok(()) => self.sink.close(),
            Err(err) => {
                self.sink.abort();
                Err(err)
            },
        };
        if let Err(err) = res {
            remove_incomplete(output_file);
            return Err(err);
        }
        if let Some(bytes) = self.sink.written_bytes() {
            reporter.written_bytes(bytes);
        }

        Ok(Summary {
            frames: frames.len(),
            output: Some(output_file.to_path_buf()),
            width,
            height,
        })
    }

    fn append_all(&mut self, frames: &FrameSequence, first: Frame, params: &StreamParams, reporter: &mut dyn ProgressReporter) -> CatResult<()> {
        let mut first = Some(first);
        for (i, path) in frames.iter().enumerate() {
            let image = match first.take() {
                Some(image) => image,
                None => self.decoder.decode(path)?,
            };
            debug!("frame {} {} ({}×{})", i, path.display(), image.width(), image.height());
            let image = resized(image, params.width, params.height)?;
            self.sink.append_frame(image.as_ref())?;
            if let Some(bytes) = self.sink.written_bytes() {
                reporter.written_bytes(bytes);
            }
            if !reporter.increase() {
                return Err(Error::Aborted);
            }
        }
        Ok(())
    }
}

fn remove_incomplete(output_file: &Path) {
    if !output_file.exists() {
        return;
    }
    warn!("Removing incomplete {}", output_file.display());
    if let Err(e) = fs::remove_file(output_file) {
        debug!("can't remove {}: {}", output_file.display(), e);
    }
}

/// Scales (never crops) the frame to exactly `width`×`height`. Aspect ratio is not preserved.
pub fn resized(mut image: Frame, width: usize, height: usize) -> CatResult<Frame> {
    if image.width() == width && image.height() == height {
        return Ok(image);
    }
    if image.width() != image.stride() {
        let mut contig = Vec::new();
        contig.try_reserve(image.width() * image.height())?;
        contig.extend(image.rows().flat_map(|r| r.iter().copied()));
        image = ImgVec::new(contig, image.width(), image.height());
    }
    let mut r = resize::new(image.width(), image.height(), width, height, resize::Pixel::RGB8, resize::Type::Lanczos3)?;
    let mut dst = Vec::new();
    dst.try_reserve(width * height)?;
    dst.resize(width * height, RGB8::new(0, 0, 0));
    r.resize(image.buf(), &mut dst)?;
    Ok(ImgVec::new(dst, width, height))
}

/// Converts every `*.png` in `input_folder` into `output_file`, using the PNG decoder and
/// the sink picked by [`sink_for_path`].
#[cfg(feature = "png")]
pub fn convert(input_folder: impl AsRef<Path>, output_file: impl AsRef<Path>, settings: Settings, reporter: &mut dyn ProgressReporter) -> CatResult<Summary> {
    let request = ConversionRequest::new(input_folder.as_ref(), output_file.as_ref());
    // before sink_for_path, so that an empty path is reported as such
    request.validate()?;
    let sink = sink_for_path(&request.output_file, settings.codec_for(&request.output_file))?;
    Converter::new(LodepngDecoder::new(), sink, settings).convert(&request, reporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        opened: Option<StreamParams>,
        frames: Vec<(usize, usize, RGB8)>,
        closed: usize,
        aborted: usize,
    }

    /// Records calls instead of writing a file
    #[derive(Clone, Default)]
    struct RecordingSink(Rc<RefCell<Log>>);

    impl VideoSink for RecordingSink {
        fn open(&mut self, _: &Path, params: &StreamParams) -> CatResult<()> {
            self.0.borrow_mut().opened = Some(*params);
            Ok(())
        }
        fn append_frame(&mut self, frame: ImgRef<'_, RGB8>) -> CatResult<()> {
            let center = frame[(frame.width() / 2, frame.height() / 2)];
            self.0.borrow_mut().frames.push((frame.width(), frame.height(), center));
            Ok(())
        }
        fn close(&mut self) -> CatResult<()> {
            self.0.borrow_mut().closed += 1;
            Ok(())
        }
        fn abort(&mut self) {
            self.0.borrow_mut().aborted += 1;
        }
    }

    /// "Decodes" file names: `<r>_<w>x<h>.png` gives a solid frame with red = r
    struct FakeDecoder {
        decoded: Vec<PathBuf>,
    }

    impl ImageDecoder for FakeDecoder {
        fn decode(&mut self, path: &Path) -> CatResult<Frame> {
            self.decoded.push(path.to_path_buf());
            let stem = path.file_stem().unwrap().to_str().unwrap();
            let parsed = stem.split_once('_').and_then(|(r, size)| {
                let (w, h) = size.split_once('x')?;
                Some((r.parse::<u8>().ok()?, w.parse::<usize>().ok()?, h.parse::<usize>().ok()?))
            });
            let (r, w, h) = parsed.ok_or_else(|| Error::FrameDecode(path.to_path_buf(), "corrupt".into()))?;
            Ok(ImgVec::new(vec![RGB8::new(r, 0, 0); w * h], w, h))
        }
    }

    fn converter(settings: Settings) -> (Converter<FakeDecoder, RecordingSink>, Rc<RefCell<Log>>) {
        let sink = RecordingSink::default();
        let log = sink.0.clone();
        (Converter::new(FakeDecoder { decoded: vec![] }, sink, settings), log)
    }

    fn seq(names: &[&str]) -> FrameSequence {
        FrameSequence::from_paths(names.iter().map(PathBuf::from).collect(), SortOrder::Lexicographic)
    }

    #[test]
    fn frames_are_resized_to_fixed_size_in_order() {
        let (mut c, log) = converter(Settings::default());
        let summary = c.write_sequence(&seq(&["c/30_4x3.png", "a/10_8x6.png", "b/20_2x2.png"]), Path::new("out"), &mut NoProgress {}).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!((summary.width, summary.height), (640, 480));

        let log = log.borrow();
        // "out" has no extension
        assert_eq!(log.opened.unwrap().codec, Codec::H264);
        assert_eq!(log.frames.len(), 3);
        for (&(w, h, px), expected_red) in log.frames.iter().zip([10, 20, 30]) {
            assert_eq!((w, h), (640, 480));
            assert!((i32::from(px.r) - expected_red).abs() <= 1, "{px:?} != {expected_red}");
        }
        assert_eq!((log.closed, log.aborted), (1, 0));
    }

    #[test]
    fn first_frame_size_policy() {
        let settings = Settings { frame_size: FrameSize::FirstFrame, ..Settings::default() };
        let (mut c, log) = converter(settings);
        c.write_sequence(&seq(&["1_5x7.png", "2_10x10.png"]), Path::new("out"), &mut NoProgress {}).unwrap();
        let log = log.borrow();
        let opened = log.opened.unwrap();
        assert_eq!((opened.width, opened.height), (5, 7));
        assert!(log.frames.iter().all(|&(w, h, _)| (w, h) == (5, 7)));
    }

    #[test]
    fn first_frame_is_decoded_once() {
        let (mut c, _) = converter(Settings::default());
        c.write_sequence(&seq(&["1_2x2.png", "2_2x2.png"]), Path::new("out"), &mut NoProgress {}).unwrap();
        assert_eq!(c.decoder.decoded, [PathBuf::from("1_2x2.png"), PathBuf::from("2_2x2.png")]);
    }

    #[test]
    fn empty_sequence_opens_nothing() {
        let (mut c, log) = converter(Settings::default());
        let summary = c.write_sequence(&seq(&[]), Path::new("out"), &mut NoProgress {}).unwrap();
        assert_eq!(summary.output, None);
        assert_eq!(summary.frames, 0);
        assert!(log.borrow().opened.is_none());
    }

    #[test]
    fn decode_failure_aborts_instead_of_closing() {
        let (mut c, log) = converter(Settings::default());
        let err = c.write_sequence(&seq(&["1_2x2.png", "2_broken.png", "3_2x2.png"]), Path::new("out"), &mut NoProgress {}).unwrap_err();
        assert!(matches!(err, Error::FrameDecode(ref p, _) if p == Path::new("2_broken.png")));
        let log = log.borrow();
        assert_eq!(log.frames.len(), 1);
        assert_eq!((log.closed, log.aborted), (0, 1));
        assert!(!c.decoder.decoded.contains(&PathBuf::from("3_2x2.png")));
    }

    #[test]
    fn failed_open_leaves_no_file() {
        /// Creates the output, then gives up like a misconfigured encoder
        struct FailingOpen;
        impl VideoSink for FailingOpen {
            fn open(&mut self, path: &Path, _: &StreamParams) -> CatResult<()> {
                fs::File::create(path)?;
                Err(Error::Video("Invalid argument".into()))
            }
            fn append_frame(&mut self, _: ImgRef<'_, RGB8>) -> CatResult<()> {
                unreachable!()
            }
            fn close(&mut self) -> CatResult<()> {
                unreachable!()
            }
            fn abort(&mut self) {}
        }

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let mut c = Converter::new(FakeDecoder { decoded: vec![] }, FailingOpen, Settings::default());
        let err = c.write_sequence(&seq(&["1_2x2.png"]), &out, &mut NoProgress {}).unwrap_err();
        assert!(matches!(err, Error::Video(_)), "{err}");
        assert!(!out.exists());
    }

    #[test]
    fn reporter_can_abort() {
        struct StopAfterOne(usize);
        impl ProgressReporter for StopAfterOne {
            fn increase(&mut self) -> bool {
                self.0 += 1;
                self.0 < 1
            }
        }
        let (mut c, log) = converter(Settings::default());
        let err = c.write_sequence(&seq(&["1_2x2.png", "2_2x2.png"]), Path::new("out"), &mut StopAfterOne(0)).unwrap_err();
        assert!(matches!(err, Error::Aborted));
        assert_eq!(log.borrow().aborted, 1);
    }

    #[test]
    fn empty_output_is_checked_before_the_folder() {
        let err = ConversionRequest::new("/does/not/exist", "").validate().unwrap_err();
        assert_eq!(err.to_string(), "Output file path must not be empty");
    }

    #[test]
    fn missing_folder_is_a_validation_error() {
        let err = ConversionRequest::new("no-such-folder-here", "out.y4m").validate().unwrap_err();
        match err {
            Error::Validation(msg) => assert!(msg.contains("searched in"), "{msg}"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn zero_fps_is_rejected() {
        let (mut c, log) = converter(Settings { fps: 0, ..Settings::default() });
        assert!(matches!(c.write_sequence(&seq(&["1_2x2.png"]), Path::new("out"), &mut NoProgress {}), Err(Error::Validation(_))));
        assert!(log.borrow().opened.is_none());
    }

    #[test]
    fn resize_keeps_solid_color() {
        let img = ImgVec::new(vec![RGB8::new(50, 100, 150); 32 * 24], 32, 24);
        let out = resized(img, 64, 40).unwrap();
        assert_eq!((out.width(), out.height()), (64, 40));
        let px = out[(32usize, 20usize)];
        assert!((i32::from(px.g) - 100).abs() <= 1, "{px:?}");
    }
}
