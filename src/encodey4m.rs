use crate::error::{CatResult, Error};
use crate::sink::{check_frame_size, StreamParams, VideoSink};
use imgref::ImgRef;
use rgb::RGB8;
use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

struct CountingWriter<W> {
    writer: Rc<RefCell<W>>,
    written: Rc<Cell<u64>>,
}

impl<W: Write> Write for CountingWriter<W> {
    #[inline(always)]
    fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        let len = self.writer.borrow_mut().write(buf)?;
        self.written.set(self.written.get() + len as u64);
        Ok(len)
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<(), std::io::Error> {
        self.writer.borrow_mut().flush()
    }
}

/// Writes uncompressed YUV4MPEG2 (4:4:4, limited range BT.601)
pub struct Y4mSink {
    file: Option<Rc<RefCell<BufWriter<File>>>>,
    y4m_enc: Option<y4m::Encoder<CountingWriter<BufWriter<File>>>>,
    written: Rc<Cell<u64>>,
    width: usize,
    height: usize,
    planes: [Vec<u8>; 3],
}

impl Y4mSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            file: None,
            y4m_enc: None,
            written: Rc::new(Cell::new(0)),
            width: 0,
            height: 0,
            planes: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    fn fill_planes(&mut self, frame: ImgRef<'_, RGB8>) -> CatResult<()> {
        let len = self.width * self.height;
        for plane in &mut self.planes {
            plane.clear();
            plane.try_reserve(len)?;
        }
        let [y, u, v] = &mut self.planes;
        for px in frame.pixels() {
            let (py, pu, pv) = rgb_to_yuv(px);
            y.push(py);
            u.push(pu);
            v.push(pv);
        }
        Ok(())
    }
}

impl Default for Y4mSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSink for Y4mSink {
    fn open(&mut self, path: &Path, params: &StreamParams) -> CatResult<()> {
        if self.file.is_some() {
            return Err(Error::validation("Y4M stream is already open"));
        }
        let file = Rc::new(RefCell::new(BufWriter::new(File::create(path)?)));
        self.written.set(0);
        let w = CountingWriter {
            writer: file.clone(),
            written: self.written.clone(),
        };
        let enc = y4m::encode(params.width, params.height, y4m::Ratio::new(params.fps as usize, 1))
            .with_colorspace(y4m::Colorspace::C444)
            .write_header(w)?;

        self.width = params.width;
        self.height = params.height;
        self.file = Some(file);
        self.y4m_enc = Some(enc);
        Ok(())
    }

    fn append_frame(&mut self, frame: ImgRef<'_, RGB8>) -> CatResult<()> {
        if self.y4m_enc.is_none() {
            return Err(Error::NotOpen);
        }
        check_frame_size(frame, self.width, self.height)?;
        self.fill_planes(frame)?;

        let enc = self.y4m_enc.as_mut().ok_or(Error::NotOpen)?;
        let [y, u, v] = &self.planes;
        enc.write_frame(&y4m::Frame::new([&y[..], &u[..], &v[..]], None))?;
        Ok(())
    }

    fn close(&mut self) -> CatResult<()> {
        // the encoder holds a second handle to the file
        drop(self.y4m_enc.take());
        if let Some(file) = self.file.take() {
            file.borrow_mut().flush()?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.y4m_enc = None;
        self.file = None;
    }

    fn written_bytes(&self) -> Option<u64> {
        Some(self.written.get())
    }
}

/// BT.601, limited range
#[inline]
fn rgb_to_yuv(px: RGB8) -> (u8, u8, u8) {
    let r = i32::from(px.r);
    let g = i32::from(px.g);
    let b = i32::from(px.b);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (y as u8, u as u8, v as u8)
}
