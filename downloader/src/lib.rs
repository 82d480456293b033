#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate fetches remote model files into a well-known local slot,
//! ready to be handed off to the rest of the print pipeline.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::Url;
use std::path::{Path, PathBuf};

/// Client is a handle used to download source models.
#[derive(Clone, Debug, Default)]
pub struct Client {
    client: reqwest::Client,
}

impl Client {
    /// Create a new download Client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Fetch every url into the slot, in order, and return the local path
    /// of each one.
    ///
    /// A single url is written to `slot` itself. When there is more than
    /// one url, each is written beside the slot as `<stem>-<index>.<ext>`.
    pub async fn fetch(&self, urls: &[String], slot: &Path) -> Result<Vec<PathBuf>> {
        if let Some(parent) = slot.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut paths = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let destination = if urls.len() == 1 {
                slot.to_owned()
            } else {
                slot_path(slot, index)
            };

            tracing::debug!(url = url.as_str(), path = format!("{:?}", destination), "fetching model");
            let body = self.get(url).await?;
            tokio::fs::write(&destination, &body)
                .await
                .with_context(|| format!("failed to write {}", destination.display()))?;
            paths.push(destination);
        }

        Ok(paths)
    }

    /// Return the body behind `url`. `file://` urls are read from disk.
    pub async fn get(&self, url: &str) -> Result<Bytes> {
        let parsed = Url::parse(url).with_context(|| format!("invalid model url: {}", url))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("invalid file url: {}", url))?;
            let body = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            return Ok(body.into());
        }

        Ok(self
            .client
            .get(parsed)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?
            .error_for_status()?
            .bytes()
            .await?)
    }
}

fn slot_path(slot: &Path, index: usize) -> PathBuf {
    let stem = slot.file_stem().and_then(|s| s.to_str()).unwrap_or("fetch");
    let name = match slot.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}-{}.{}", stem, index, ext),
        None => format!("{}-{}", stem, index),
    };
    slot.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_path() {
        assert_eq!(
            slot_path(Path::new("data/fetch.stl"), 2),
            PathBuf::from("data/fetch-2.stl")
        );
        assert_eq!(slot_path(Path::new("data/fetch"), 0), PathBuf::from("data/fetch-0"));
    }

    #[tokio::test]
    async fn test_fetch_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.stl");
        let b = dir.path().join("b.stl");
        std::fs::write(&a, "solid a").unwrap();
        std::fs::write(&b, "solid b").unwrap();

        let urls = vec![
            Url::from_file_path(&a).unwrap().to_string(),
            Url::from_file_path(&b).unwrap().to_string(),
        ];
        let slot = dir.path().join("data").join("fetch.stl");

        let paths = Client::new().fetch(&urls, &slot).await.unwrap();
        assert_eq!(
            paths,
            vec![dir.path().join("data/fetch-0.stl"), dir.path().join("data/fetch-1.stl")]
        );
        assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "solid a");
        assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "solid b");
    }

    #[tokio::test]
    async fn test_fetch_single_url_uses_slot() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.stl");
        std::fs::write(&a, "solid a").unwrap();

        let slot = dir.path().join("fetch.stl");
        let urls = vec![Url::from_file_path(&a).unwrap().to_string()];
        let paths = Client::new().fetch(&urls, &slot).await.unwrap();
        assert_eq!(paths, vec![slot.clone()]);
    }

    #[tokio::test]
    async fn test_fetch_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let urls = vec![Url::from_file_path(dir.path().join("nope.stl")).unwrap().to_string()];
        assert!(Client::new().fetch(&urls, &dir.path().join("fetch.stl")).await.is_err());
    }
}
