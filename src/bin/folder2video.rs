#[macro_use] extern crate clap;

use folder2video::progress::{NoProgress, ProgressReporter};
use folder2video::{sink_for_path, Codec, ConversionRequest, Converter, FrameSequence, FrameSize, LodepngDecoder, Settings, SortOrder};

use clap::{Arg, ArgAction, Command};
use pbr::ProgressBar;

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

const VIDEO_DISABLED_HELP: &str = r"Video encoding is permanently disabled in this executable.

To write compressed video you need to recompile folder2video from source with:
cargo build --release --features=video
or
cargo install folder2video --features=video

Alternatively, write an uncompressed .y4m file with this executable
and compress it with the ffmpeg command.";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = bin_main() {
        eprintln!("error: {}", e);
        if let Some(e) = e.source() {
            eprintln!("error: {}", e);
        }
        std::process::exit(1);
    }
}

fn cli() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about("Encodes a folder of PNG images into a video, one frame per image, in file name order")
        .arg(Arg::new("input-folder")
            .long("input-folder")
            .short('i')
            .help("Folder with the *.png frames")
            .value_name("path")
            .value_parser(value_parser!(OsString)))
        .arg(Arg::new("output-file")
            .long("output-file")
            .short('o')
            .help("Destination video file. The extension picks the container; .y4m is written without ffmpeg")
            .value_name("path")
            .value_parser(value_parser!(OsString))
            .default_value("output.m4v"))
        .arg(Arg::new("fps")
            .long("fps")
            .short('r')
            .help("Frame rate of the video")
            .value_name("num")
            .value_parser(value_parser!(u32).range(1..=240))
            .default_value("60"))
        .arg(Arg::new("codec")
            .long("codec")
            .short('c')
            .help("h264, mjpeg, mpeg4 or raw [default: h264, or raw for .y4m]")
            .value_name("name")
            .value_parser(|s: &str| s.parse::<Codec>()))
        .arg(Arg::new("width")
            .long("width")
            .short('W')
            .help("Width of the video. Frames are stretched to fit")
            .value_name("px")
            .value_parser(value_parser!(u32).range(1..))
            .default_value("640"))
        .arg(Arg::new("height")
            .long("height")
            .short('H')
            .help("Height of the video. Frames are stretched to fit")
            .value_name("px")
            .value_parser(value_parser!(u32).range(1..))
            .default_value("480"))
        .arg(Arg::new("native-size")
            .long("native-size")
            .help("Use the size of the first image instead of --width/--height")
            .action(ArgAction::SetTrue)
            .conflicts_with_all(["width", "height"]))
        .arg(Arg::new("natural-sort")
            .long("natural-sort")
            .help("Sort frame2.png before frame10.png")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("quiet")
            .long("quiet")
            .short('q')
            .help("Do not display progress")
            .action(ArgAction::SetTrue))
}

fn bin_main() -> BinResult<()> {
    let matches = match cli().try_get_matches_from(wild::args_os()) {
        Ok(m) => m,
        Err(e) if e.use_stderr() => {
            print!("{}", e.render());
            std::process::exit(2);
        },
        Err(e) => e.exit(),
    };

    // a missing folder is reported by validate()
    let input_folder = matches.get_one::<OsString>("input-folder").map(PathBuf::from).unwrap_or_default();
    let output_file = matches.get_one::<OsString>("output-file").ok_or("Missing output file")?;
    let request = ConversionRequest::new(input_folder, PathBuf::from(output_file));
    request.validate()?;

    let frame_size = if matches.get_flag("native-size") {
        FrameSize::FirstFrame
    } else {
        FrameSize::Fixed {
            width: *matches.get_one::<u32>("width").ok_or("Missing width")? as usize,
            height: *matches.get_one::<u32>("height").ok_or("Missing height")? as usize,
        }
    };
    let order = if matches.get_flag("natural-sort") { SortOrder::Natural } else { SortOrder::Lexicographic };
    let settings = Settings {
        fps: *matches.get_one::<u32>("fps").ok_or("Missing fps")?,
        codec: matches.get_one::<Codec>("codec").copied(),
        frame_size,
        order,
    };
    let quiet = matches.get_flag("quiet");

    let sink = match sink_for_path(&request.output_file, settings.codec_for(&request.output_file)) {
        Ok(sink) => sink,
        Err(folder2video::Error::VideoDisabled) => return Err(VIDEO_DISABLED_HELP.into()),
        Err(e) => return Err(e.into()),
    };

    let frames = FrameSequence::scan(&request.input_folder, order)?;
    if frames.is_empty() {
        if !quiet {
            eprintln!("warning: no *.png files in \"{}\"; nothing was written", request.input_folder.display());
        }
        return Ok(());
    }

    let mut pb;
    let mut nopb = NoProgress {};
    let progress: &mut dyn ProgressReporter = if quiet {
        &mut nopb
    } else {
        pb = ProgressBar::new(frames.len() as u64);
        pb.show_speed = false;
        pb.show_percent = false;
        pb.format(" #_. ");
        pb.message("Frame ");
        pb.set_max_refresh_rate(Some(Duration::from_millis(250)));
        &mut pb
    };

    let mut converter = Converter::new(LodepngDecoder::new(), sink, settings);
    let summary = converter.write_sequence(&frames, &request.output_file, progress)?;
    progress.done(&format!("folder2video created {} ({} frames, {}×{})",
        DestPath(&request.output_file), summary.frames, summary.width, summary.height));

    Ok(())
}

struct DestPath<'a>(&'a Path);

impl fmt::Display for DestPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let abs_path = dunce::canonicalize(self.0);
        write!(f, "{}", abs_path.as_ref().map(|p| p.as_path()).unwrap_or(self.0).display())
    }
}
