//! Download of file URLs the vendor cannot fetch itself.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::future::try_join_all;
use reqwest::Client;
use tracing::{debug, instrument};

use super::SupportedUrls;
use crate::types::{FileData, FilePart, Message, Prompt, UserContent};
use crate::{HuginnError, Result};

/// A downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub data: Vec<u8>,
    /// `content-type` of the response, if the server sent one.
    pub media_type: Option<String>,
}

/// HTTP downloader for file parts.
#[derive(Clone)]
pub struct Downloader {
    http: Client,
}

impl Default for Downloader {
    fn default() -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

impl Downloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client (shared connection pool).
    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }

    /// Fetch a URL.
    #[instrument(name = "huginn.download", skip(self))]
    pub async fn download(&self, url: &str) -> Result<DownloadedFile> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HuginnError::Download {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string());

        let data = response.bytes().await?.to_vec();
        debug!(bytes = data.len(), ?media_type, "downloaded file");

        Ok(DownloadedFile { data, media_type })
    }
}

/// Decode a `data:` URL into its media type and payload.
///
/// Returns `Ok(None)` for other URLs. Base64 payloads are validated and kept
/// as base64; plain payloads are percent-decoded into bytes. A missing media
/// type defaults to `text/plain`.
pub fn parse_data_url(url: &str) -> Result<Option<(String, FileData)>> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Ok(None);
    };
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| HuginnError::InvalidPrompt("data URL without payload".into()))?;

    let (header, is_base64) = match header.strip_suffix(";base64") {
        Some(header) => (header, true),
        None => (header, false),
    };
    let media_type = match header.split(';').next().map(str::trim) {
        Some(media_type) if !media_type.is_empty() => media_type.to_string(),
        _ => "text/plain".to_string(),
    };

    let data = if is_base64 {
        BASE64
            .decode(payload)
            .map_err(|e| HuginnError::InvalidPrompt(format!("invalid data URL: {e}")))?;
        FileData::Base64(payload.to_string())
    } else {
        FileData::Bytes(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    };
    Ok(Some((media_type, data)))
}

/// Inline every user file part whose URL the vendor cannot fetch itself.
///
/// `data:` URLs are decoded in place. Other unsupported URLs are downloaded
/// concurrently; when the part's media type is a wildcard (`image/*`), the
/// response `content-type` replaces it.
pub async fn download_unsupported_files(
    prompt: &Prompt,
    supported: &SupportedUrls,
    downloader: &Downloader,
) -> Result<Prompt> {
    let mut pending = Vec::new();
    for message in prompt {
        if let Message::User { content, .. } = message {
            for part in content {
                if let UserContent::File(file) = part
                    && let Some(url) = file.data.as_url()
                    && !url.starts_with("data:")
                    && !supported.is_supported(&file.media_type, url)
                {
                    pending.push(url.to_string());
                }
            }
        }
    }
    pending.sort();
    pending.dedup();

    let downloads = try_join_all(pending.iter().map(|url| downloader.download(url))).await?;
    let downloaded: Vec<(String, DownloadedFile)> = pending.into_iter().zip(downloads).collect();

    let mut out = prompt.clone();
    for message in &mut out {
        if let Message::User { content, .. } = message {
            for part in content.iter_mut() {
                if let UserContent::File(file) = part {
                    inline_file(file, &downloaded)?;
                }
            }
        }
    }
    Ok(out)
}

fn inline_file(file: &mut FilePart, downloaded: &[(String, DownloadedFile)]) -> Result<()> {
    let Some(url) = file.data.as_url().map(str::to_string) else {
        return Ok(());
    };

    if let Some((media_type, data)) = parse_data_url(&url)? {
        if file.media_type.ends_with("/*") {
            file.media_type = media_type;
        }
        file.data = data;
        return Ok(());
    }

    if let Some((_, download)) = downloaded.iter().find(|(u, _)| *u == url) {
        if file.media_type.ends_with("/*")
            && let Some(ref media_type) = download.media_type
        {
            file.media_type = media_type.clone();
        }
        file.data = FileData::Bytes(download.data.clone());
    }
    Ok(())
}
