//! Directory-style listing of a bucket
//!
//! A [`Directory`] walks the direct children of a key prefix page by page,
//! using `/` as the delimiter, and yields them as [`Entry`] values.
//!
//! ```no_run
//! use s3util::{list::Directory, Config, S3Client};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::new(&Config::default())?;
//! let mut dir = Directory::new(&client, "https://my-bucket.s3.amazonaws.com/photos")?;
//! while let Some(entries) = dir.read_dir(100).await? {
//!     for entry in entries {
//!         println!("{} dir={}", entry.name(), entry.is_dir());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::s3::xml::{self, ListBucketResult, ListedObject, Owner};
use crate::s3::{S3Client, S3ClientError, QUERY_VALUE};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Method, Uri};
use percent_encoding::{percent_decode_str, utf8_percent_encode};

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full key of the object
    pub key: String,
    pub size: u64,
    /// As sent by the service, see [`ObjectInfo::modified`]
    pub last_modified: String,
    /// Entity tag with the quotes trimmed
    pub etag: String,
    pub storage_class: String,
    pub owner: Option<Owner>,
}

impl ObjectInfo {
    /// Parsed modification time, `None` if the service sent something else
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_modified)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

impl From<ListedObject> for ObjectInfo {
    fn from(object: ListedObject) -> Self {
        Self {
            etag: object.etag.trim_matches('"').to_string(),
            key: object.key,
            size: object.size,
            last_modified: object.last_modified,
            storage_class: object.storage_class,
            owner: object.owner,
        }
    }
}

/// A direct child of a listed prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(ObjectInfo),
    /// Key prefix with the trailing `/` trimmed
    Directory(String),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::File(info) => &info.key,
            Entry::Directory(name) => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }
}

/// Paginated listing of one key prefix
#[derive(Debug)]
pub struct Directory {
    client: S3Client,
    /// `scheme://authority/`
    base: String,
    prefix: String,
    marker: Option<String>,
    exhausted: bool,
}

impl Directory {
    /// List the prefix named by the path of `url`.
    ///
    /// `url` must address the bucket by host (`https://bucket.s3.amazonaws.com/dir`)
    /// and cannot carry a query or fragment.
    pub fn new(client: &S3Client, url: &str) -> Result<Self, S3ClientError> {
        if url.contains('?') {
            return Err(S3ClientError::RequestError(
                "listing URL cannot have query parameters".into(),
            ));
        }
        if url.contains('#') {
            return Err(S3ClientError::RequestError(
                "listing URL cannot have a fragment".into(),
            ));
        }

        let uri: Uri = url
            .parse()
            .map_err(|e| S3ClientError::RequestError(format!("invalid URL {url}: {e}")))?;
        let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) else {
            return Err(S3ClientError::RequestError(format!(
                "URL must be absolute: {url}"
            )));
        };

        let path = percent_decode_str(uri.path())
            .decode_utf8()
            .map_err(|e| S3ClientError::RequestError(e.to_string()))?;
        let mut prefix = path.trim_start_matches('/').to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        Ok(Self {
            client: client.clone(),
            base: format!("{scheme}://{authority}/"),
            prefix,
            marker: None,
            exhausted: false,
        })
    }

    /// Key prefix being listed, empty or ending in `/`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fetch the next page of at most `count` entries (`0` lets the service
    /// choose, at most 1000).
    ///
    /// Returns `Ok(None)` once the last page has been returned.
    #[tracing::instrument(
        name = "s3.list_objects",
        skip(self),
        fields(s3.prefix = %self.prefix, entries = tracing::field::Empty),
        err
    )]
    pub async fn read_dir(&mut self, count: usize) -> Result<Option<Vec<Entry>>, S3ClientError> {
        if self.exhausted {
            return Ok(None);
        }

        let request = self.client.signed_request(
            Method::GET,
            &self.page_url(count),
            None,
            Bytes::new(),
        )?;
        let response = self.client.send(request).await?;
        let body = response.into_body().bytes().await?;
        let result: ListBucketResult = xml::from_xml(&body)?;

        self.exhausted = !result.is_truncated;
        self.marker = next_marker(&result);

        let entries = into_entries(result);
        tracing::Span::current().record("entries", entries.len());
        Ok(Some(entries))
    }

    /// Fetch every remaining page
    pub async fn read_all(&mut self) -> Result<Vec<Entry>, S3ClientError> {
        let mut entries = Vec::new();
        while let Some(page) = self.read_dir(0).await? {
            entries.extend(page);
        }
        Ok(entries)
    }

    fn page_url(&self, count: usize) -> String {
        let mut url = format!("{}?delimiter=%2F", self.base);
        if !self.prefix.is_empty() {
            url.push_str("&prefix=");
            url.extend(utf8_percent_encode(&self.prefix, QUERY_VALUE));
        }
        if count > 0 {
            url.push_str(&format!("&max-keys={count}"));
        }
        if let Some(marker) = self.marker.as_deref() {
            url.push_str("&marker=");
            url.extend(utf8_percent_encode(marker, QUERY_VALUE));
        }
        url
    }
}

/// The later of the last key and the last common prefix of a truncated page
fn next_marker(result: &ListBucketResult) -> Option<String> {
    if !result.is_truncated {
        return None;
    }
    let last_key = result.contents.last().map(|c| c.key.as_str());
    let last_dir = result.common_prefixes.last().map(|p| p.prefix.as_str());
    last_key.max(last_dir).filter(|m| !m.is_empty()).map(str::to_string)
}

fn into_entries(result: ListBucketResult) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(result.contents.len() + result.common_prefixes.len());

    for object in result.contents {
        // Zero-length "folder" placeholder objects
        if object.size == 0 && object.key.ends_with('/') {
            entries.push(Entry::Directory(object.key.trim_end_matches('/').to_string()));
        } else {
            entries.push(Entry::File(object.into()));
        }
    }
    for prefix in result.common_prefixes {
        entries.push(Entry::Directory(
            prefix.prefix.trim_end_matches('/').to_string(),
        ));
    }

    entries
}
