use bytes::{BufMut, Bytes, BytesMut};

use crate::{Command, Frame, Result, SurgeError};

const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB limit

pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame, adding `content-length` when the body is non-empty.
    pub fn encode(frame: &Frame) -> Result<BytesMut> {
        if frame.body.len() > MAX_FRAME_SIZE {
            return Err(SurgeError::FrameDecode(format!(
                "Frame too large: {} bytes",
                frame.body.len()
            )));
        }

        let escape = escapes_headers(frame.command);
        let mut buf = BytesMut::with_capacity(64 + frame.body.len());
        buf.put_slice(frame.command.as_str().as_bytes());
        buf.put_u8(b'\n');
        for (name, value) in &frame.headers {
            put_header_part(&mut buf, name, escape);
            buf.put_u8(b':');
            put_header_part(&mut buf, value, escape);
            buf.put_u8(b'\n');
        }
        if !frame.body.is_empty() && frame.get_header("content-length").is_none() {
            buf.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }
        buf.put_u8(b'\n');
        buf.put_slice(&frame.body);
        buf.put_u8(0);
        Ok(buf)
    }

    /// Decode every frame in `data`. Heart-beat EOLs between frames are
    /// skipped.
    pub fn decode_all(data: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        Self::decode_into(data, &mut frames)?;
        Ok(frames)
    }

    /// Like [`FrameCodec::decode_all`], but frames are appended to `out` as
    /// they are decoded, so the ones preceding a malformed frame survive the
    /// error.
    pub fn decode_into(data: &[u8], out: &mut impl Extend<Frame>) -> Result<()> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(SurgeError::FrameDecode(format!(
                "Frame too large: {} bytes",
                data.len()
            )));
        }

        let mut rest = data;
        loop {
            rest = skip_eols(rest);
            if rest.is_empty() {
                return Ok(());
            }
            let (frame, remaining) = decode_one(rest)?;
            out.extend(Some(frame));
            rest = remaining;
        }
    }
}

fn decode_one(data: &[u8]) -> Result<(Frame, &[u8])> {
    let (command_line, mut rest) = split_line(data)?;
    let command_text = std::str::from_utf8(command_line)
        .map_err(|_| SurgeError::FrameDecode("command is not UTF-8".into()))?;
    let command = Command::parse(command_text)
        .ok_or_else(|| SurgeError::FrameDecode(format!("unknown command '{}'", command_text)))?;
    let escape = escapes_headers(command);

    let mut frame = Frame::new(command);
    loop {
        let (line, remaining) = split_line(rest)?;
        rest = remaining;
        if line.is_empty() {
            break;
        }
        let line = std::str::from_utf8(line)
            .map_err(|_| SurgeError::FrameDecode("header is not UTF-8".into()))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| SurgeError::FrameDecode(format!("malformed header '{}'", line)))?;
        let (name, value) = if escape {
            (unescape(name)?, unescape(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        frame.headers.push((name, value));
    }

    let body_len = match frame.get_header("content-length") {
        Some(len) => {
            let len: usize = len.trim().parse().map_err(|_| {
                SurgeError::FrameDecode(format!("invalid content-length '{}'", len))
            })?;
            if rest.len() <= len || rest[len] != 0 {
                return Err(SurgeError::FrameDecode(
                    "body shorter than content-length or not NUL terminated".into(),
                ));
            }
            len
        }
        None => rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| SurgeError::FrameDecode("frame is not NUL terminated".into()))?,
    };

    frame.body = Bytes::copy_from_slice(&rest[..body_len]);
    Ok((frame, &rest[body_len + 1..]))
}

/// CONNECT and CONNECTED frames carry their headers verbatim.
fn escapes_headers(command: Command) -> bool {
    !matches!(command, Command::Connect | Command::Connected)
}

fn skip_eols(mut data: &[u8]) -> &[u8] {
    loop {
        match data {
            [b'\n', rest @ ..] => data = rest,
            [b'\r', b'\n', rest @ ..] => data = rest,
            _ => return data,
        }
    }
}

fn split_line(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let end = data
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| SurgeError::FrameDecode("truncated frame".into()))?;
    let line = &data[..end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Ok((line, &data[end + 1..]))
}

fn put_header_part(buf: &mut BytesMut, text: &str, escape: bool) {
    if !escape {
        buf.put_slice(text.as_bytes());
        return;
    }
    for ch in text.chars() {
        match ch {
            '\\' => buf.put_slice(b"\\\\"),
            '\n' => buf.put_slice(b"\\n"),
            '\r' => buf.put_slice(b"\\r"),
            ':' => buf.put_slice(b"\\c"),
            other => {
                let mut utf8 = [0u8; 4];
                buf.put_slice(other.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
}

fn unescape(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(SurgeError::FrameDecode(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
