//! Support for fetching source models over HTTP with [downloader].

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::Fetch;

impl Fetch for downloader::Client {
    type Error = anyhow::Error;

    async fn fetch(&self, urls: &[String], slot: &Path) -> Result<Vec<PathBuf>> {
        downloader::Client::fetch(self, urls, slot).await
    }
}
