// showcache - Episode rotation with a bounded local cache
// Copyright (C) 2025 The showcache contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! AWS Signature Version 4 for bucket requests
//!
//! Only body-less requests are signed, so the payload hash is always the hash
//! of the empty string. Signed headers are `host`, `x-amz-content-sha256` and
//! `x-amz-date`.

use crate::error::{Result, WatchError};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// SHA-256 of an empty body
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Signs requests with an access key pair for one region
#[derive(Clone)]
pub struct RequestSigner {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new<A, S, R>(access_key_id: A, secret_access_key: S, region: R) -> Self
    where
        A: Into<String>,
        S: Into<String>,
        R: Into<String>,
    {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Headers to add to a `method` request for `url` made at `now`
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        now: DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, SERVICE);

        let canonical = canonical_request(method, url, &amz_date);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let key = signing_key(&self.secret_access_key, &date_stamp, &self.region, SERVICE)?;
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key_id, scope, SIGNED_HEADERS, signature
        );
        Ok(vec![
            ("x-amz-date", amz_date),
            ("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()),
            ("authorization", authorization),
        ])
    }
}

/// Canonical request text that the signature covers
pub fn canonical_request(method: &str, url: &Url, amz_date: &str) -> String {
    let path = match url.path_segments() {
        Some(segments) => segments
            .map(|segment| uri_encode(&percent_decode(segment), true))
            .fold(String::new(), |mut path, segment| {
                path.push('/');
                path.push_str(&segment);
                path
            }),
        None => String::new(),
    };
    let path = if path.is_empty() { "/".to_string() } else { path };

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    query.sort();
    let query = query
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}\n{}\n{}\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        method,
        path,
        query,
        host_header(url),
        EMPTY_PAYLOAD_SHA256,
        amz_date,
        SIGNED_HEADERS,
        EMPTY_PAYLOAD_SHA256
    )
}

/// `host[:port]`, the port only when it is not the scheme's default
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Key derived from the secret for one day, region and service
pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| WatchError::internal(format!("signing key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode everything except unreserved characters
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Undo the URL's own path encoding so each segment is encoded exactly once
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(decoded) = hex::decode(&bytes[i + 1..i + 3]) {
                out.extend_from_slice(&decoded);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_signing_key_matches_published_example() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_empty_payload_hash() {
        assert_eq!(hex::encode(Sha256::digest(b"")), EMPTY_PAYLOAD_SHA256);
    }

    #[test]
    fn test_canonical_request_sorts_and_encodes_query() {
        let url = Url::parse(
            "https://s3.us-west-2.amazonaws.com/videos?prefix=simpsons%2F&marker=a%20b",
        )
        .unwrap();
        let canonical = canonical_request("GET", &url, "20250101T000000Z");
        let lines: Vec<&str> = canonical.lines().collect();
        assert_eq!(lines[0], "GET");
        assert_eq!(lines[1], "/videos");
        assert_eq!(lines[2], "marker=a%20b&prefix=simpsons%2F");
        assert_eq!(lines[3], "host:s3.us-west-2.amazonaws.com");
        assert_eq!(lines[5], "x-amz-date:20250101T000000Z");
        assert_eq!(lines[7], SIGNED_HEADERS);
    }

    #[test]
    fn test_canonical_path_encodes_each_segment_once() {
        let url = Url::parse("http://localhost:9000/videos/simpsons/Lisa's%20Pony.mp4").unwrap();
        let canonical = canonical_request("GET", &url, "20250101T000000Z");
        let lines: Vec<&str> = canonical.lines().collect();
        assert_eq!(lines[1], "/videos/simpsons/Lisa%27s%20Pony.mp4");
        assert_eq!(lines[3], "host:localhost:9000");
    }

    #[test]
    fn test_sign_builds_authorization_header() {
        let signer = RequestSigner::new("AKIDEXAMPLE", "secret", "us-west-2");
        let url = Url::parse("https://s3.us-west-2.amazonaws.com/videos/simpsons/a.mp4").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();

        let headers = signer.sign("GET", &url, now).unwrap();
        let get = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("x-amz-date"), "20250304T050607Z");
        let authorization = get("authorization");
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20250304/us-west-2/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        let signature = authorization.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);

        // Same request, different secret
        let other = RequestSigner::new("AKIDEXAMPLE", "other", "us-west-2").sign("GET", &url, now).unwrap();
        assert_ne!(other[2].1, authorization);
        assert!(!format!("{:?}", signer).contains("secret"));
    }
}
