//! SigV2 string-to-sign construction.
//!
//! ```text
//! StringToSign = HTTP-Verb + "\n" +
//!                Content-MD5 + "\n" +
//!                Content-Type + "\n" +
//!                Date + "\n" +
//!                CanonicalizedAmzHeaders +
//!                CanonicalizedResource
//! ```
//!
//! The output depends only on the method, the headers of interest, the host,
//! the path and the signed sub-resource parameters. Header insertion order and
//! query parameter order do not affect it.

use http::{HeaderMap, Request};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Query parameters that name a sub-resource and take part in the signature.
///
/// Everything else in the query string (`prefix`, `marker`, `max-keys`, ...)
/// is left out of the canonicalized resource.
pub const SIGNED_SUB_RESOURCES: &[&str] = &[
    "acl",
    "delete",
    "lifecycle",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "torrent",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
];

/// Build the string to sign for `request` against a service rooted at `domain`.
pub fn string_to_sign<B>(domain: &str, request: &Request<B>) -> String {
    let headers = request.headers();
    let mut out = String::with_capacity(128);

    out.push_str(request.method().as_str());
    out.push('\n');
    out.push_str(&header_value(headers, "content-md5"));
    out.push('\n');
    out.push_str(&header_value(headers, "content-type"));
    out.push('\n');
    // When x-amz-date is present it is signed as an amz header instead.
    if !headers.contains_key("x-amz-date") {
        out.push_str(&header_value(headers, "date"));
    }
    out.push('\n');
    write_amz_headers(&mut out, headers);
    write_resource(&mut out, domain, request);

    out
}

/// Derive the bucket addressed by `host` for a service rooted at `domain`.
///
/// - `host == domain`: path-style addressing, no bucket.
/// - `host == "<bucket>.<domain>"`: virtual-hosted bucket.
/// - anything else: a CNAME, the whole lower-cased host is the bucket.
pub fn vhost_bucket(domain: &str, host: &str) -> Option<String> {
    let host = strip_port(host).to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();

    if host.is_empty() || host == domain {
        return None;
    }

    match host
        .strip_suffix(domain.as_str())
        .and_then(|rest| rest.strip_suffix('.'))
    {
        Some("") => None,
        Some(bucket) => Some(bucket.to_owned()),
        None => Some(host),
    }
}

/// Build the CanonicalizedAmzHeaders string.
///
/// All x-amz-* headers are lowercased, sorted by name, and emitted as
/// `name:value1,value2\n`.
fn write_amz_headers(out: &mut String, headers: &HeaderMap) {
    let mut amz_headers: BTreeMap<&str, Vec<Cow<'_, str>>> = BTreeMap::new();

    for (name, value) in headers {
        let name = name.as_str();
        if name.starts_with("x-amz-") {
            amz_headers
                .entry(name)
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()));
        }
    }

    for (name, values) in &amz_headers {
        out.push_str(name);
        out.push(':');
        out.push_str(&values.join(","));
        out.push('\n');
    }
}

/// Build the CanonicalizedResource string: bucket, path, signed sub-resources.
fn write_resource<B>(out: &mut String, domain: &str, request: &Request<B>) {
    if let Some(bucket) = request_host(request).and_then(|host| vhost_bucket(domain, &host)) {
        out.push('/');
        out.push_str(&bucket);
    }
    out.push_str(request.uri().path());
    write_sub_resources(out, request.uri().query());
}

fn write_sub_resources(out: &mut String, query: Option<&str>) {
    let Some(query) = query else {
        return;
    };

    let mut params: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_query_component(raw_key);
            if !SIGNED_SUB_RESOURCES.contains(&key.as_str()) {
                return None;
            }
            let value = decode_query_component(raw_value);
            Some(if value.is_empty() {
                key
            } else {
                format!("{key}={value}")
            })
        })
        .collect();

    params.sort();

    let mut separator = '?';
    for param in &params {
        out.push(separator);
        out.push_str(param);
        separator = '&';
    }
}

fn decode_query_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw).decode_utf8_lossy().into_owned()
}

/// Host of the request, taken from the URI authority or the Host header.
fn request_host<B>(request: &Request<B>) -> Option<String> {
    if let Some(host) = request.uri().host() {
        return Some(host.to_owned());
    }
    request
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| strip_port(h).to_owned())
}

fn strip_port(host: &str) -> &str {
    host.split_once(':').map_or(host, |(name, _)| name)
}

/// Extract a header value as a string, returning empty string if missing.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Cow<'a, str> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .unwrap_or(Cow::Borrowed(""))
}
