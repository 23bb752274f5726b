//! Buffering writer
//!
//! Accumulates written bytes into a buffer whose target size follows a
//! geometric schedule, and emits a [`Part`] each time the buffer fills.

use super::{Part, UploadError};
use crate::config::UploadConfig;
use bytes::{Bytes, BytesMut};

/// Part size schedule.
///
/// The first part is `min` bytes, every following part is the previous one
/// times `growth` (rounded down), capped at `max`. Sizes never decrease.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartSizer {
    next: u64,
    max: u64,
    growth: f64,
}

impl PartSizer {
    pub fn new(min: u64, max: u64, growth: f64) -> Self {
        let max = max.max(1);
        Self {
            next: min.clamp(1, max),
            max,
            growth,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            config.min_part_size,
            config.max_part_size,
            config.part_size_growth,
        )
    }

    /// Size of the next part, without advancing
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Size of the next part; advances the schedule
    pub fn next_size(&mut self) -> u64 {
        let size = self.next;
        let grown = (size as f64 * self.growth).floor();
        self.next = if grown >= self.max as f64 {
            self.max
        } else {
            (grown as u64).max(size)
        };
        size
    }

    /// Skip the sizes of `parts` already issued parts
    pub fn advance(&mut self, parts: u32) {
        for _ in 0..parts {
            if self.next == self.max {
                break;
            }
            self.next_size();
        }
    }
}

/// Buffering writer that turns a byte stream into numbered parts
#[derive(Debug)]
pub struct PartBuffer {
    sizer: PartSizer,
    buf: BytesMut,
    /// Size of the part being filled, 0 when no part is started
    target: u64,
    issued: u32,
    max_parts: u32,
}

impl PartBuffer {
    pub fn new(sizer: PartSizer, max_parts: u32) -> Self {
        Self {
            sizer,
            buf: BytesMut::new(),
            target: 0,
            issued: 0,
            max_parts,
        }
    }

    /// Continue after `issued` parts with `buffered` bytes already pending
    pub fn resume(
        mut sizer: PartSizer,
        issued: u32,
        buffered: &[u8],
        max_parts: u32,
    ) -> Result<Self, UploadError> {
        sizer.advance(issued);
        let mut buffer = Self {
            sizer,
            buf: BytesMut::new(),
            target: 0,
            issued,
            max_parts,
        };

        if !buffered.is_empty() {
            buffer.start_part()?;
            buffer.target = buffer.target.max(buffered.len() as u64);
            buffer.buf.extend_from_slice(buffered);
        }

        Ok(buffer)
    }

    /// Number of parts emitted so far
    pub fn issued(&self) -> u32 {
        self.issued
    }

    /// Bytes waiting in the current part
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Copy as much of `data` as fits into the current part.
    ///
    /// Returns the number of bytes consumed and the part if it became full.
    /// Callers loop until all of `data` is consumed.
    pub fn fill(&mut self, data: &[u8]) -> Result<(usize, Option<Part>), UploadError> {
        if data.is_empty() {
            return Ok((0, None));
        }
        if self.target == 0 {
            self.start_part()?;
        }

        let room = self.target.saturating_sub(self.buf.len() as u64);
        let n = usize::try_from(room).map_or(data.len(), |room| room.min(data.len()));
        self.buf.extend_from_slice(&data[..n]);

        if self.buf.len() as u64 >= self.target {
            Ok((n, Some(self.take_part())))
        } else {
            Ok((n, None))
        }
    }

    /// Emit the pending bytes as a (short) part
    pub fn flush(&mut self) -> Option<Part> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.take_part())
    }

    /// Emit the last part of the object.
    ///
    /// An object that never received a byte still gets one empty part, so
    /// the completion request always lists at least one part.
    pub fn finish(&mut self) -> Result<Option<Part>, UploadError> {
        if let Some(part) = self.flush() {
            return Ok(Some(part));
        }
        if self.issued == 0 {
            self.start_part()?;
            return Ok(Some(self.take_part()));
        }
        Ok(None)
    }

    /// Take the pending bytes out without emitting a part.
    ///
    /// The part number stays unused, so the bytes can be written again later
    /// under the same number.
    pub fn take_remainder(&mut self) -> Bytes {
        self.target = 0;
        std::mem::take(&mut self.buf).freeze()
    }

    fn start_part(&mut self) -> Result<(), UploadError> {
        if self.issued >= self.max_parts {
            return Err(UploadError::TooManyParts {
                max: self.max_parts,
            });
        }
        self.target = self.sizer.next_size();
        if let Ok(capacity) = usize::try_from(self.target) {
            self.buf.reserve(capacity);
        }
        Ok(())
    }

    fn take_part(&mut self) -> Part {
        self.issued += 1;
        self.target = 0;
        let data = std::mem::take(&mut self.buf).freeze();
        Part::new(self.issued, data)
    }
}
