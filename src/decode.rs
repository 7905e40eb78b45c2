//! Turning image files into frames

use crate::error::CatResult;
#[cfg(feature = "png")]
use crate::error::Error;
use imgref::ImgVec;
use rgb::RGB8;
use std::path::Path;

/// A decoded image. Alpha, if the file had any, is dropped.
pub type Frame = ImgVec<RGB8>;

/// Reads one image file into memory
pub trait ImageDecoder {
    /// Errors should be [`Error::FrameDecode`](crate::Error::FrameDecode) naming `path`.
    fn decode(&mut self, path: &Path) -> CatResult<Frame>;
}

/// PNG decoder backed by `lodepng`
#[cfg(feature = "png")]
#[derive(Debug, Default)]
pub struct LodepngDecoder {}

#[cfg(feature = "png")]
impl LodepngDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }
}

#[cfg(feature = "png")]
impl ImageDecoder for LodepngDecoder {
    fn decode(&mut self, path: &Path) -> CatResult<Frame> {
        let image = lodepng::decode24_file(path)
            .map_err(|err| Error::FrameDecode(path.to_path_buf(), err.to_string()))?;
        if image.width == 0 || image.height == 0 {
            return Err(Error::FrameDecode(path.to_path_buf(), "image is empty".into()));
        }
        Ok(ImgVec::new(image.buffer, image.width, image.height))
    }
}
