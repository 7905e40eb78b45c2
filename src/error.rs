use std::io;
use std::path::PathBuf;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// Bad request: empty output path, missing input folder, etc.
        Validation(msg: String) {
            display("{}", msg)
        }
        FrameDecode(path: PathBuf, msg: String) {
            display("Can't decode {}: {}", path.display(), msg)
        }
        WrongSize(msg: String) {
            display("{}", msg)
            from(e: resize::Error) -> (e.to_string())
        }
        Io(err: io::Error) {
            from()
            from(_oom: std::collections::TryReserveError) -> (io::ErrorKind::OutOfMemory.into())
            display("I/O: {}", err)
        }
        Y4m(err: y4m::Error) {
            display("Y4M encoding error: {}", err)
        }
        Video(msg: String) {
            display("Video encoding error: {}", msg)
        }
        VideoDisabled {
            display("Video encoding support is disabled in this build")
        }
        NotOpen {
            display("Video stream is not open")
        }
        Aborted {
            display("aborted")
        }
    }
}

pub type CatResult<T, E = Error> = Result<T, E>;

impl From<y4m::Error> for Error {
    #[cold]
    fn from(err: y4m::Error) -> Self {
        match err {
            y4m::Error::IoError(err) => err.into(),
            other => Error::Y4m(other),
        }
    }
}

#[cfg(feature = "video")]
impl From<ffmpeg::Error> for Error {
    #[cold]
    fn from(err: ffmpeg::Error) -> Self {
        Error::Video(err.to_string())
    }
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
