//! A numbered slice of the object being uploaded

use crate::s3::CompletedPart;
use bytes::Bytes;

/// One part of a multipart upload.
///
/// The number and length are fixed at creation. The data can be read any
/// number of times until [`Part::release`] drops it, and the entity tag can be
/// set only once.
#[derive(Debug, Clone)]
pub struct Part {
    number: u32,
    len: u64,
    data: Option<Bytes>,
    etag: Option<String>,
}

impl Part {
    pub fn new(number: u32, data: Bytes) -> Self {
        Self {
            number,
            len: data.len() as u64,
            data: Some(data),
            etag: None,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Part data from its first byte, or `None` once released.
    ///
    /// Every call returns an independent handle, so an attempt never sees a
    /// position left behind by a previous one.
    pub fn body(&self) -> Option<Bytes> {
        self.data.clone()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Record the entity tag of a successful upload.
    ///
    /// Returns `false` and keeps the first tag if one was already recorded.
    pub fn set_etag(&mut self, etag: impl Into<String>) -> bool {
        if self.etag.is_some() {
            return false;
        }
        self.etag = Some(etag.into());
        true
    }

    /// Drop the part data
    pub fn release(&mut self) {
        self.data = None;
    }

    pub fn is_released(&self) -> bool {
        self.data.is_none()
    }

    /// Completion entry for this part, once it has been uploaded
    pub fn completed(&self) -> Option<CompletedPart> {
        self.etag
            .as_ref()
            .map(|etag| CompletedPart::new(self.number, etag.clone()))
    }
}
