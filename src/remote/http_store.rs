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


//! S3-compatible object store over plain HTTP
//!
//! Talks to buckets using path-style URLs:
//!
//! - Listing: `GET {endpoint}/{bucket}?prefix=..&delimiter=..&marker=..`
//!   (ListObjects v1 XML)
//! - Transfer: `GET {endpoint}/{bucket}/{key}`, streamed into the temp file and
//!   renamed into place once the body is complete
//!
//! Requests are signed with SigV4 when a [`RequestSigner`] is set and sent
//! anonymously otherwise, which works for public-read buckets.

use super::signing::RequestSigner;
use super::{ListRequest, ObjectListing, ObjectStore, ObjectSummary};
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use reqwest::Client;
use roxmltree::{Document, Node};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use url::Url;

/// Flush the temp file every 256 KiB so progress sampling sees it grow
const FLUSH_INTERVAL: u64 = 256 * 1024;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// S3-compatible client
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
    signer: Option<RequestSigner>,
}

impl HttpObjectStore {
    /// Create a client for `endpoint` (e.g. `https://s3.us-west-2.amazonaws.com`)
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("showcache/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, endpoint)
    }

    /// Create with a preconfigured reqwest client
    pub fn with_client(client: Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(WatchError::configuration(format!(
                "endpoint '{}' cannot be used as a base URL",
                endpoint
            )));
        }
        Ok(Self {
            client,
            endpoint,
            signer: None,
        })
    }

    /// Sign every request with these credentials
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL of one listing page
    pub fn listing_url(&self, request: &ListRequest) -> Result<Url> {
        let mut url = self.bucket_url(&request.bucket, &[])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(prefix) = &request.prefix {
                query.append_pair("prefix", prefix);
            }
            if let Some(delimiter) = &request.delimiter {
                query.append_pair("delimiter", delimiter);
            }
            if let Some(marker) = &request.marker {
                query.append_pair("marker", marker);
            }
        }
        Ok(url)
    }

    /// URL of one object
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let segments: Vec<&str> = key.split('/').collect();
        self.bucket_url(bucket, &segments)
    }

    fn bucket_url(&self, bucket: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| WatchError::configuration("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(bucket)
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let mut request = self.client.get(url.clone());
        if let Some(signer) = &self.signer {
            for (name, value) in signer.sign("GET", &url, Utc::now())? {
                request = request.header(name, value);
            }
        }
        let response = request.send().await.map_err(|e| {
            WatchError::transport(format!("request to {} failed: {}", url, e), None)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = error_code(&body).unwrap_or_else(|| status.to_string());
            return Err(WatchError::transport(
                format!("{} returned {}", url.path(), code),
                Some(status.as_u16()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list_objects(&self, request: &ListRequest) -> Result<ObjectListing> {
        let url = self.listing_url(request)?;
        debug!(%url, "Listing objects");
        let body = self.get(url).await?.text().await?;
        parse_listing(&body)
    }

    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        temp_path: &Path,
        destination: &Path,
    ) -> Result<()> {
        let url = self.object_url(bucket, key)?;
        let response = self.get(url).await?;

        let file = File::create(temp_path).await?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut since_flush: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                WatchError::transport(format!("transfer of {} interrupted: {}", key, e), None)
            })?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
            since_flush += chunk.len() as u64;
            if since_flush >= FLUSH_INTERVAL {
                writer.flush().await?;
                since_flush = 0;
            }
        }
        writer.flush().await?;
        drop(writer);

        tokio::fs::rename(temp_path, destination).await?;
        info!(key, bytes = written, "Transfer complete");
        Ok(())
    }
}

/// Parse a ListObjects (v1) response body
pub fn parse_listing(xml: &str) -> Result<ObjectListing> {
    let doc = Document::parse(xml)
        .map_err(|e| WatchError::transport(format!("unreadable listing: {}", e), None))?;
    let root = doc.root_element();
    if root.tag_name().name() == "Error" {
        let code = child_text(root, "Code").unwrap_or("unknown");
        return Err(WatchError::transport(format!("listing failed: {}", code), None));
    }

    let mut listing = ObjectListing {
        truncated: child_text(root, "IsTruncated") == Some("true"),
        next_marker: child_text(root, "NextMarker")
            .filter(|m| !m.is_empty())
            .map(str::to_string),
        ..Default::default()
    };

    for node in root.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "Contents" => {
                let Some(key) = child_text(node, "Key") else {
                    continue;
                };
                let size = child_text(node, "Size")
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0);
                listing.items.push(ObjectSummary {
                    key: key.to_string(),
                    size,
                });
            }
            "CommonPrefixes" => {
                if let Some(prefix) = child_text(node, "Prefix") {
                    listing.common_prefixes.push(prefix.to_string());
                }
            }
            _ => {}
        }
    }
    Ok(listing)
}

fn child_text<'a>(node: Node<'a, 'a>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
}

fn error_code(body: &str) -> Option<String> {
    let doc = Document::parse(body).ok()?;
    let root = doc.root_element();
    child_text(root, "Code").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>videos</Name>
  <Prefix>simpsons/</Prefix>
  <Marker></Marker>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <Contents>
    <Key>simpsons/Bart_the_Genius.m3u8</Key>
    <LastModified>2019-02-01T10:00:00.000Z</LastModified>
    <Size>4096</Size>
  </Contents>
  <Contents>
    <Key>simpsons/</Key>
    <Size>0</Size>
  </Contents>
</ListBucketResult>"#;

    #[test]
    fn test_signer_is_optional() {
        let store = HttpObjectStore::new("https://s3.us-west-2.amazonaws.com").unwrap();
        assert!(!store.is_signed());
        let store = store.with_signer(RequestSigner::new("AKIDEXAMPLE", "secret", "us-west-2"));
        assert!(store.is_signed());
    }

    #[test]
    fn test_parse_listing_page() {
        let listing = parse_listing(PAGE).unwrap();
        assert!(listing.truncated);
        assert_eq!(listing.next_marker, None);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].key, "simpsons/Bart_the_Genius.m3u8");
        assert_eq!(listing.items[0].size, 4096);
        assert_eq!(listing.items[1].size, 0);
    }

    #[test]
    fn test_parse_common_prefixes() {
        let xml = r#"<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <CommonPrefixes><Prefix>futurama/</Prefix></CommonPrefixes>
  <CommonPrefixes><Prefix>simpsons/</Prefix></CommonPrefixes>
</ListBucketResult>"#;
        let listing = parse_listing(xml).unwrap();
        assert!(!listing.truncated);
        assert_eq!(listing.common_prefixes, vec!["futurama/", "simpsons/"]);
        assert!(listing.items.is_empty());
    }

    #[test]
    fn test_parse_error_document() {
        let xml = "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>";
        let err = parse_listing(xml).unwrap_err();
        assert!(err.is_transport_error());
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[test]
    fn test_listing_url() {
        let store = HttpObjectStore::new("https://s3.us-west-2.amazonaws.com").unwrap();
        let url = store
            .listing_url(&ListRequest {
                bucket: "videos".into(),
                prefix: Some("simpsons/".into()),
                delimiter: None,
                marker: Some("simpsons/a b.m3u8".into()),
            })
            .unwrap();
        assert_eq!(url.path(), "/videos");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("prefix".into(), "simpsons/".into()));
        assert_eq!(pairs[1], ("marker".into(), "simpsons/a b.m3u8".into()));
    }

    #[test]
    fn test_object_url_keeps_key_slashes() {
        let store = HttpObjectStore::new("http://localhost:9000/").unwrap();
        let url = store.object_url("videos", "simpsons/Lisa's Pony.m3u8").unwrap();
        assert!(url.as_str().starts_with("http://localhost:9000/videos/simpsons/Lisa"));
    }
}
