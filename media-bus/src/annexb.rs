//! Length-prefixed (AVCC/HVCC) to start-code (Annex B) conversion.
//!
//! MP4 and Matroska store H.264/HEVC NAL units behind a length field and
//! keep the parameter sets in the stream's configuration record. A raw
//! decoder with no extradata needs start codes instead, with the parameter
//! sets in band.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{MediaError, Result};

const START_CODE: &[u8] = &[0x00, 0x00, 0x00, 0x01];

/// Whether `data` begins with a 3 or 4 byte start code.
pub fn is_annexb(data: &[u8]) -> bool {
    data.starts_with(START_CODE) || data.starts_with(&START_CODE[1..])
}

/// Rewrites length-prefixed payloads of one stream as Annex B.
#[derive(Debug, Clone)]
pub struct AnnexBFilter {
    length_size: usize,
    /// SPS/PPS (and VPS for HEVC) with start codes, put in front of every
    /// key frame.
    parameter_sets: Bytes,
}

impl AnnexBFilter {
    /// Builds a filter for a stream of `codec` ("h264" or "hevc") with the
    /// given configuration record. `None` when the payloads need no
    /// conversion: other codecs, an Annex B record, or no record at all.
    pub fn for_stream(codec: &str, extradata: &[u8]) -> Result<Option<Self>> {
        if extradata.is_empty() || is_annexb(extradata) {
            return Ok(None);
        }
        let parsed = match codec {
            "h264" => parse_avcc(extradata),
            "hevc" => parse_hvcc(extradata),
            _ => return Ok(None),
        };
        parsed.map(Some).ok_or_else(|| {
            MediaError::Configuration(format!("malformed {codec} configuration record"))
        })
    }

    pub fn parameter_sets(&self) -> &Bytes {
        &self.parameter_sets
    }

    /// Converts one payload. NAL units after a truncated length field are
    /// dropped.
    pub fn filter(&self, data: &[u8], is_key: bool) -> Bytes {
        let prefix = if is_key { self.parameter_sets.len() } else { 0 };
        let mut out = BytesMut::with_capacity(prefix + data.len() + 8);
        if is_key {
            out.extend_from_slice(&self.parameter_sets);
        }
        let mut rest = data;
        while rest.len() >= self.length_size {
            let len = read_length(&rest[..self.length_size]);
            rest = &rest[self.length_size..];
            if len == 0 || len > rest.len() {
                break;
            }
            out.extend_from_slice(START_CODE);
            out.extend_from_slice(&rest[..len]);
            rest = &rest[len..];
        }
        out.freeze()
    }
}

fn read_length(field: &[u8]) -> usize {
    field.iter().fold(0, |len, &b| len << 8 | usize::from(b))
}

/// Appends `count` 16-bit length prefixed NAL units from `buf` to `out`.
fn copy_nal_units(buf: &mut &[u8], count: usize, out: &mut BytesMut) -> Option<()> {
    for _ in 0..count {
        if buf.remaining() < 2 {
            return None;
        }
        let len = usize::from(buf.get_u16());
        if buf.remaining() < len {
            return None;
        }
        out.extend_from_slice(START_CODE);
        out.extend_from_slice(&buf[..len]);
        buf.advance(len);
    }
    Some(())
}

/// AVCDecoderConfigurationRecord (ISO/IEC 14496-15 5.2.4.1).
fn parse_avcc(record: &[u8]) -> Option<AnnexBFilter> {
    let mut buf = record;
    if buf.remaining() < 6 || buf[0] != 1 {
        return None;
    }
    buf.advance(4);
    let length_size = usize::from(buf.get_u8() & 0x03) + 1;
    let mut sets = BytesMut::new();
    let sps = usize::from(buf.get_u8() & 0x1f);
    copy_nal_units(&mut buf, sps, &mut sets)?;
    if buf.remaining() < 1 {
        return None;
    }
    let pps = usize::from(buf.get_u8());
    copy_nal_units(&mut buf, pps, &mut sets)?;
    Some(AnnexBFilter {
        length_size,
        parameter_sets: sets.freeze(),
    })
}

/// HEVCDecoderConfigurationRecord (ISO/IEC 14496-15 8.3.3.1).
fn parse_hvcc(record: &[u8]) -> Option<AnnexBFilter> {
    let mut buf = record;
    if buf.remaining() < 23 || buf[0] != 1 {
        return None;
    }
    buf.advance(21);
    let length_size = usize::from(buf.get_u8() & 0x03) + 1;
    let arrays = buf.get_u8();
    let mut sets = BytesMut::new();
    for _ in 0..arrays {
        if buf.remaining() < 3 {
            return None;
        }
        buf.advance(1);
        let count = usize::from(buf.get_u16());
        copy_nal_units(&mut buf, count, &mut sets)?;
    }
    Some(AnnexBFilter {
        length_size,
        parameter_sets: sets.freeze(),
    })
}

#[cfg(test)]
#[path = "annexb_test.rs"]
mod annexb_test;
