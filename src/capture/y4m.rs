//! Minimal YUV4MPEG2 reader for raw file playback.
//!
//! Only 4:2:0 streams are accepted. Frames are returned as packed I420 buffers.

use std::io::{self, BufRead, Read, Seek, SeekFrom};

use super::playback::FrameReader;
use crate::frame::{i420_len, MAX_FRAME_DIMENSION};

pub(crate) const MAGIC: &str = "YUV4MPEG2";
const FRAME_TAG: &[u8] = b"FRAME";
const MAX_HEADER_LEN: u64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
}

pub(crate) fn parse_header(line: &str) -> Result<Y4mHeader, String> {
    let mut tokens = line.split_ascii_whitespace();
    if tokens.next() != Some(MAGIC) {
        return Err(format!("missing {} signature", MAGIC));
    }

    let mut width = None;
    let mut height = None;
    let mut fps = (30, 1);
    for token in tokens {
        let Some(tag) = token.get(..1) else {
            continue;
        };
        let value = &token[1..];
        match tag {
            "W" => width = Some(parse_dimension("width", value)?),
            "H" => height = Some(parse_dimension("height", value)?),
            "F" => fps = parse_ratio(value)?,
            "C" if !value.starts_with("420") => {
                return Err(format!("unsupported colour space C{}", value));
            }
            _ => {}
        }
    }

    Ok(Y4mHeader {
        width: width.ok_or("header has no width")?,
        height: height.ok_or("header has no height")?,
        fps_num: fps.0,
        fps_den: fps.1,
    })
}

fn parse_dimension(name: &str, value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(v) if v > MAX_FRAME_DIMENSION => Err(format!(
            "{} {} exceeds {}",
            name, v, MAX_FRAME_DIMENSION
        )),
        Ok(v) if v > 0 => Ok(v),
        _ => Err(format!("invalid {} {:?}", name, value)),
    }
}

fn parse_ratio(value: &str) -> Result<(u32, u32), String> {
    let (num, den) = value
        .split_once(':')
        .ok_or_else(|| format!("invalid frame rate {:?}", value))?;
    match (num.parse::<u32>(), den.parse::<u32>()) {
        (Ok(num), Ok(den)) if den > 0 => Ok((num, den)),
        _ => Err(format!("invalid frame rate {:?}", value)),
    }
}

/// Sequential frame reader that can rewind to the first frame.
pub(crate) struct Y4mReader<R> {
    inner: R,
    header: Y4mHeader,
    first_frame: u64,
    frame_len: usize,
}

impl<R: BufRead + Seek> Y4mReader<R> {
    pub fn new(mut inner: R) -> Result<Self, String> {
        let mut line = Vec::new();
        (&mut inner)
            .take(MAX_HEADER_LEN)
            .read_until(b'\n', &mut line)
            .map_err(|e| format!("read header: {}", e))?;
        if line.last() != Some(&b'\n') {
            return Err("header is not terminated".to_string());
        }
        let text = std::str::from_utf8(&line).map_err(|_| "header is not ASCII".to_string())?;
        let header = parse_header(text)?;
        let frame_len = i420_len(header.width, header.height)
            .ok_or_else(|| format!("frame size {}x{} out of range", header.width, header.height))?;
        let first_frame = inner
            .stream_position()
            .map_err(|e| format!("locate first frame: {}", e))?;
        Ok(Self {
            inner,
            header,
            first_frame,
            frame_len,
        })
    }

    pub fn header(&self) -> Y4mHeader {
        self.header
    }
}

impl<R: BufRead + Seek> FrameReader for Y4mReader<R> {
    fn dimensions(&self) -> (u32, u32) {
        (self.header.width, self.header.height)
    }

    /// Next frame, or `None` at end of file. A truncated last frame counts as
    /// end of file.
    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut tag = Vec::new();
        let n = (&mut self.inner)
            .take(MAX_HEADER_LEN)
            .read_until(b'\n', &mut tag)?;
        if n == 0 {
            return Ok(None);
        }
        if !tag.starts_with(FRAME_TAG) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "expected FRAME marker",
            ));
        }

        let mut data = vec![0u8; self.frame_len];
        match self.inner.read_exact(&mut data) {
            Ok(()) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(self.first_frame))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn encode(width: u32, height: u32, frames: &[u8]) -> Vec<u8> {
    let mut out = format!("YUV4MPEG2 W{} H{} F30:1 Ip A1:1 C420jpeg\n", width, height).into_bytes();
    let frame_len = i420_len(width, height).expect("test frame size");
    for value in frames {
        out.extend_from_slice(b"FRAME\n");
        out.extend(std::iter::repeat(*value).take(frame_len));
    }
    out
}
