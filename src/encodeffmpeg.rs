//! Compressed output through ffmpeg's encoders and muxers

use crate::error::{CatResult, Error};
use crate::sink::{check_frame_size, Codec, StreamParams, VideoSink};
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::util::frame::video::Video;
use ffmpeg::Rational;
use imgref::ImgRef;
use rgb::RGB8;
use std::path::Path;

struct Stream {
    octx: ffmpeg::format::context::Output,
    encoder: ffmpeg::codec::encoder::video::Encoder,
    scaler: scaling::Context,
    rgb_frame: Video,
    time_base: Rational,
}

/// Encodes with H.264, MJPEG or MPEG-4 into whatever container the file extension implies
pub struct FfmpegSink {
    stream: Option<Stream>,
    width: usize,
    height: usize,
    frame_count: i64,
}

impl FfmpegSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stream: None,
            width: 0,
            height: 0,
            frame_count: 0,
        }
    }
}

impl Default for FfmpegSink {
    fn default() -> Self {
        Self::new()
    }
}

fn codec_setup(codec: Codec) -> CatResult<(ffmpeg::codec::Id, Pixel)> {
    Ok(match codec {
        Codec::H264 => (ffmpeg::codec::Id::H264, Pixel::YUV420P),
        Codec::Mjpeg => (ffmpeg::codec::Id::MJPEG, Pixel::YUVJ420P),
        Codec::Mpeg4 => (ffmpeg::codec::Id::MPEG4, Pixel::YUV420P),
        Codec::Raw => return Err(Error::validation("The raw codec is written as .y4m, not through ffmpeg")),
    })
}

impl Stream {
    fn drain(&mut self) -> CatResult<()> {
        let ost_time_base = self.octx.stream(0).ok_or(Error::NotOpen)?.time_base();
        let mut encoded = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(self.time_base, ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }
}

impl VideoSink for FfmpegSink {
    fn open(&mut self, path: &Path, params: &StreamParams) -> CatResult<()> {
        if self.stream.is_some() {
            return Err(Error::validation("Video stream is already open"));
        }
        ffmpeg::init()?;

        let (codec_id, pix_fmt) = codec_setup(params.codec)?;
        let width = u32::try_from(params.width).map_err(|e| Error::WrongSize(e.to_string()))?;
        let height = u32::try_from(params.height).map_err(|e| Error::WrongSize(e.to_string()))?;
        let fps = i32::try_from(params.fps).map_err(|e| Error::Validation(e.to_string()))?;

        if params.codec == Codec::H264 && (width % 2 != 0 || height % 2 != 0) {
            return Err(Error::WrongSize(format!("H.264 needs an even frame size, not {width}×{height}")));
        }
        let codec = ffmpeg::encoder::find(codec_id)
            .ok_or_else(|| Error::Video(format!("{} encoder is not available in this ffmpeg build", params.codec)))?;

        // creates the file
        let mut octx = ffmpeg::format::output(path)?;
        let global_header = octx.format().flags().contains(ffmpeg::format::Flags::GLOBAL_HEADER);
        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(pix_fmt);
        let time_base = Rational(1, fps);
        encoder_ctx.set_time_base(time_base);
        encoder_ctx.set_frame_rate(Some(Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;

        let scaler = scaling::Context::get(
            Pixel::RGB24, width, height,
            pix_fmt, width, height,
            scaling::Flags::BILINEAR,
        )?;

        log::debug!("ffmpeg {} stream {}×{} @ {} fps", params.codec, width, height, fps);
        self.width = params.width;
        self.height = params.height;
        self.frame_count = 0;
        self.stream = Some(Stream {
            octx,
            encoder,
            scaler,
            rgb_frame: Video::new(Pixel::RGB24, width, height),
            time_base,
        });
        Ok(())
    }

    fn append_frame(&mut self, frame: ImgRef<'_, RGB8>) -> CatResult<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotOpen)?;
        check_frame_size(frame, self.width, self.height)?;

        let row_bytes = self.width * 3;
        let stride = stream.rgb_frame.stride(0);
        let data = stream.rgb_frame.data_mut(0);
        for (row, src) in frame.rows().enumerate() {
            let dst_start = row * stride;
            data[dst_start..dst_start + row_bytes].copy_from_slice(rgb::bytemuck::cast_slice(src));
        }

        let mut yuv_frame = Video::empty();
        stream.scaler.run(&stream.rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(self.frame_count));

        stream.encoder.send_frame(&yuv_frame)?;
        stream.drain()?;
        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> CatResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.encoder.send_eof()?;
            stream.drain()?;
            stream.octx.write_trailer()?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.stream = None;
    }
}
