//! URL handling for file parts.
//!
//! Vendors can fetch some URLs themselves (e.g. public image URLs); every
//! other URL has to be downloaded and inlined before the request is built.

mod download;
mod supported;

pub use download::{DownloadedFile, Downloader, download_unsupported_files, parse_data_url};
pub use supported::{SupportedUrls, is_url_supported};
