// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splits a syslog TCP stream into frames.
//!
//! Both RFC6587 framings are accepted on the same connection: octet counting
//! (`LEN SP MSG`) when a frame starts with a digit, otherwise non-transparent
//! framing terminated by a newline.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::errors::FramingError;

/// Largest frame accepted on a TCP connection.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

// u32::MAX has ten digits, anything longer is garbage
const MAX_LENGTH_DIGITS: usize = 10;

enum Framing {
    OctetCounted { header_len: usize, msg_len: usize },
    Newline,
    Incomplete,
}

#[derive(Debug, Clone, Copy)]
pub struct SyslogFrameDecoder {
    max_length: usize,
}

impl SyslogFrameDecoder {
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        SyslogFrameDecoder { max_length }
    }

    fn framing(&self, src: &BytesMut) -> Result<Framing, FramingError> {
        let digits = src.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Ok(Framing::Newline);
        }
        if digits > MAX_LENGTH_DIGITS {
            return Err(FramingError::InvalidLength(
                String::from_utf8_lossy(&src[..MAX_LENGTH_DIGITS]).into_owned(),
            ));
        }
        match src.get(digits) {
            None => Ok(Framing::Incomplete),
            Some(b' ') => {
                let text = String::from_utf8_lossy(&src[..digits]);
                let msg_len: usize = text
                    .parse()
                    .map_err(|_| FramingError::InvalidLength(text.to_string()))?;
                if msg_len > self.max_length {
                    return Err(FramingError::FrameTooLarge(msg_len, self.max_length));
                }
                Ok(Framing::OctetCounted {
                    header_len: digits + 1,
                    msg_len,
                })
            }
            Some(_) => Ok(Framing::Newline),
        }
    }
}

impl Default for SyslogFrameDecoder {
    fn default() -> Self {
        SyslogFrameDecoder::new(MAX_FRAME_LENGTH)
    }
}

fn to_text(frame: &[u8]) -> String {
    String::from_utf8_lossy(frame)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

impl Decoder for SyslogFrameDecoder {
    type Item = String;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FramingError> {
        // stray terminators between frames
        let skip = src
            .iter()
            .take_while(|b| matches!(b, b'\n' | b'\r' | b'\0'))
            .count();
        src.advance(skip);
        if src.is_empty() {
            return Ok(None);
        }

        match self.framing(src)? {
            Framing::Incomplete => Ok(None),
            Framing::OctetCounted {
                header_len,
                msg_len,
            } => {
                let total = header_len + msg_len;
                if src.len() < total {
                    src.reserve(total - src.len());
                    return Ok(None);
                }
                let frame = src.split_to(total);
                Ok(Some(to_text(&frame[header_len..])))
            }
            Framing::Newline => match src.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    let frame = src.split_to(end + 1);
                    Ok(Some(to_text(&frame)))
                }
                None if src.len() > self.max_length => {
                    Err(FramingError::FrameTooLarge(src.len(), self.max_length))
                }
                None => Ok(None),
            },
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, FramingError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(to_text(&rest)))
    }
}
