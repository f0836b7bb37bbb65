use bytes::Bytes;

use crate::time::{self, Rational};

/// A compressed unit read from a container, produced by an encoder or
/// handed in by a live producer.
///
/// Timestamps are expressed in `time_base` units.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    data: Bytes,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: i64,
    stream_index: usize,
    is_key: bool,
    time_base: Rational,
    position: Option<i64>,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>, stream_index: usize, time_base: Rational) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            duration: 0,
            stream_index,
            is_key: false,
            time_base,
            position: None,
        }
    }

    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    pub fn with_position(mut self, position: Option<i64>) -> Self {
        self.position = position;
        self
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn index(&self) -> usize {
        self.stream_index
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Byte offset in the source container, `None` when unknown.
    pub fn position(&self) -> Option<i64> {
        self.position
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    pub fn set_dts(&mut self, dts: Option<i64>) {
        self.dts = dts;
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.duration = duration;
    }

    pub fn set_index(&mut self, index: usize) {
        self.stream_index = index;
    }

    pub fn set_position(&mut self, position: Option<i64>) {
        self.position = position;
    }

    /// Relabels the clock without touching the timestamps.
    pub fn set_time_base(&mut self, time_base: Rational) {
        self.time_base = time_base;
    }

    /// Re-expresses pts, dts and duration in `to`.
    pub fn rescale_ts(&mut self, to: Rational) {
        let from = self.time_base;
        if from == to {
            return;
        }
        self.pts = time::rescale_opt(self.pts, from, to);
        self.dts = time::rescale_opt(self.dts, from, to);
        self.duration = time::rescale(self.duration, from, to);
        self.time_base = to;
    }

    /// Presentation time in seconds.
    pub fn pts_seconds(&self) -> Option<f64> {
        self.pts.map(|p| time::to_seconds(p, self.time_base))
    }
}
