//! FFmpeg-decoded file playback.
//!
//! Decodes the best video stream of any container FFmpeg can open and
//! converts each frame to packed I420. The decoder state is not shared across
//! threads: `FfmpegFile` only records what opening found, and every playback
//! session opens its own `FfmpegReader` on the playback thread.

use ffmpeg_next as ffmpeg;
use std::io;
use std::path::{Path, PathBuf};

use super::playback::FrameReader;
use crate::frame::i420_len;

/// Inspected FFmpeg input.
#[derive(Clone, Debug)]
pub(crate) struct FfmpegFile {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl FfmpegFile {
    pub(crate) fn inspect(path: &Path) -> Result<Self, String> {
        let reader = FfmpegReader::open(path).map_err(|e| e.to_string())?;
        Ok(Self {
            path: path.to_path_buf(),
            width: reader.width,
            height: reader.height,
        })
    }

    pub(crate) fn open_reader(&self) -> io::Result<FfmpegReader> {
        FfmpegReader::open(&self.path)
    }
}

pub(crate) struct FfmpegReader {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    width: u32,
    height: u32,
    frame_len: usize,
    draining: bool,
}

impl FfmpegReader {
    fn open(path: &Path) -> io::Result<Self> {
        ffmpeg::init().map_err(to_io)?;
        let input = ffmpeg::format::input(&path).map_err(to_io)?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| invalid("file has no video track"))?;
        let stream_index = stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(to_io)?;
        let decoder = context.decoder().video().map_err(to_io)?;

        let (width, height) = (decoder.width(), decoder.height());
        let frame_len = i420_len(width, height)
            .ok_or_else(|| invalid(&format!("frame size {}x{} out of range", width, height)))?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::util::format::pixel::Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(to_io)?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            width,
            height,
            frame_len,
            draining: false,
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        let index = self.stream_index;
        self.input
            .packets()
            .find(|(stream, _)| stream.index() == index)
            .map(|(_, packet)| packet)
    }

    fn to_i420(&mut self, decoded: &ffmpeg::frame::Video) -> io::Result<Vec<u8>> {
        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler.run(decoded, &mut yuv).map_err(to_io)?;

        let (width, height) = (self.width as usize, self.height as usize);
        let planes = [
            (0, width, height),
            (1, width.div_ceil(2), height.div_ceil(2)),
            (2, width.div_ceil(2), height.div_ceil(2)),
        ];
        let mut data = Vec::with_capacity(self.frame_len);
        for (plane, row_bytes, rows) in planes {
            let stride = yuv.stride(plane);
            let bytes = yuv.data(plane);
            for row in 0..rows {
                let start = row * stride;
                data.extend_from_slice(
                    bytes
                        .get(start..start + row_bytes)
                        .ok_or_else(|| invalid("decoded frame row is out of bounds"))?,
                );
            }
        }
        Ok(data)
    }
}

impl FrameReader for FfmpegReader {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.to_i420(&decoded).map(Some);
            }
            if self.draining {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self.decoder.send_packet(&packet).map_err(to_io)?,
                None => {
                    self.decoder.send_eof().map_err(to_io)?;
                    self.draining = true;
                }
            }
        }
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.input.seek(0, ..).map_err(to_io)?;
        self.decoder.flush();
        self.draining = false;
        Ok(())
    }
}

fn to_io(e: ffmpeg::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

fn invalid(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}
