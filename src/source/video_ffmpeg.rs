//! FFmpeg-backed video file decoding.
//!
//! Demuxes and decodes a local file, scaling every frame to RGB24. Frames
//! come out in decode order; once the demuxer is exhausted the decoder is
//! flushed so trailing frames are not lost, then `next_frame` settles on
//! `Ok(None)`.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::SourceInfo;
use crate::frame::Frame;

pub(crate) struct FfmpegVideo {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    info: SourceInfo,
    finished: bool,
}

impl FfmpegVideo {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initializing ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{path}' with ffmpeg"))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{path}' has no video track"))?;
        let stream_index = input_stream.index();

        let fps = {
            let rate = input_stream.avg_frame_rate();
            if rate.denominator() != 0 {
                f64::from(rate)
            } else {
                0.0
            }
        };
        let frame_count = {
            let reported = input_stream.frames();
            if reported > 0 {
                reported as u64
            } else {
                // containers without a frame count: estimate from duration
                let duration = input_stream.duration();
                if duration > 0 && fps > 0.0 {
                    let seconds = duration as f64 * f64::from(input_stream.time_base());
                    (seconds * fps).round() as u64
                } else {
                    0
                }
            }
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("loading video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("opening ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("creating ffmpeg scaler")?;

        let info = SourceInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            frame_count,
        };
        log::info!("VideoSource: opened {} ({})", path, info.describe());

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            info,
            finished: false,
        })
    }

    pub(crate) fn info(&self) -> SourceInfo {
        self.info
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let mut decoded = ffmpeg::frame::Video::empty();

        // frames the decoder already buffered from a previous packet
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return scaled(&mut self.scaler, &decoded).map(Some);
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("sending packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return scaled(&mut self.scaler, &decoded).map(Some);
            }
        }

        // demuxer exhausted: flush the decoder for trailing frames
        let _ = self.decoder.send_eof();
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return scaled(&mut self.scaler, &decoded).map(Some);
        }

        self.finished = true;
        Ok(None)
    }
}

fn scaled(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::frame::Video,
) -> Result<Frame> {
    let mut rgb = ffmpeg::frame::Video::empty();
    scaler.run(decoded, &mut rgb).context("scaling frame to rgb")?;
    frame_from_rgb24(&rgb)
}

/// Copy an RGB24 ffmpeg frame into an owned `Frame`, dropping row padding.
fn frame_from_rgb24(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    if stride == row_bytes {
        return Frame::from_rgb8(data.to_vec(), width, height);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Frame::from_rgb8(pixels, width, height)
}
