use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Error;

/// The parameters of one print submission.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobRequest {
    /// Source models to fetch, in order. On the wire this may be a single
    /// url or a list of them.
    #[serde(rename = "url", deserialize_with = "one_or_many")]
    pub urls: Vec<String>,

    /// How many copies of the whole input set to print.
    #[serde(default = "default_count")]
    pub count: u32,

    /// Scale factor applied while normalizing.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Slicer profile name.
    #[serde(rename = "config", default = "default_profile")]
    pub profile: String,

    /// Slicer quality preset.
    #[serde(rename = "quality", default = "default_quality")]
    pub quality: String,

    /// Infill density, in `(0, 1]`.
    #[serde(default = "default_density")]
    pub density: f64,
}

fn default_count() -> u32 {
    1
}

fn default_scale() -> f64 {
    1.0
}

fn default_profile() -> String {
    "default".to_owned()
}

fn default_quality() -> String {
    "medium".to_owned()
}

fn default_density() -> f64 {
    0.05
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

impl JobRequest {
    /// Most copies of the input set a single job may ask for.
    pub const MAX_COUNT: u32 = 100;

    /// Create a new request for the given urls, with every other parameter
    /// at its default.
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            count: default_count(),
            scale: default_scale(),
            profile: default_profile(),
            quality: default_quality(),
            density: default_density(),
        }
    }

    /// Check the request is well formed.
    pub fn validate(&self) -> Result<(), Error> {
        if self.urls.is_empty() {
            return Err(Error::InvalidRequest("at least one url is required".to_owned()));
        }
        if self.urls.iter().any(|url| url.trim().is_empty()) {
            return Err(Error::InvalidRequest("urls must not be empty".to_owned()));
        }
        if self.count == 0 || self.count > Self::MAX_COUNT {
            return Err(Error::InvalidRequest(format!(
                "count must be between 1 and {}, got {}",
                Self::MAX_COUNT,
                self.count
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::InvalidRequest(format!("scale must be positive, got {}", self.scale)));
        }
        if !(self.density > 0.0 && self.density <= 1.0) {
            return Err(Error::InvalidRequest(format!(
                "density must be in (0, 1], got {}",
                self.density
            )));
        }
        Ok(())
    }

    /// Repeat the fetched input set `count` times, as one flat sequence.
    pub fn replicate(&self, fetched: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
        let too_large = || Error::InvalidRequest(format!("count {} is too large", self.count));
        if self.count > Self::MAX_COUNT {
            return Err(too_large());
        }
        let total = fetched.len().checked_mul(self.count as usize).ok_or_else(too_large)?;

        let mut inputs = Vec::with_capacity(total);
        for _ in 0..self.count {
            inputs.extend_from_slice(fetched);
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let request: JobRequest = serde_json::from_str(r#"{"url": "https://example.com/a.stl"}"#).unwrap();
        assert_eq!(request, JobRequest::new(vec!["https://example.com/a.stl".to_owned()]));
        assert_eq!(request.count, 1);
        assert_eq!(request.scale, 1.0);
        assert_eq!(request.profile, "default");
        assert_eq!(request.quality, "medium");
        assert_eq!(request.density, 0.05);
    }

    #[test]
    fn test_url_list_and_overrides() {
        let request: JobRequest = serde_json::from_str(
            r#"{
                "url": ["https://example.com/a.stl", "https://example.com/b.stl"],
                "count": 3,
                "scale": 0.5,
                "config": "pla",
                "quality": "high",
                "density": 0.2
            }"#,
        )
        .unwrap();
        assert_eq!(request.urls.len(), 2);
        assert_eq!(request.count, 3);
        assert_eq!(request.scale, 0.5);
        assert_eq!(request.profile, "pla");
        assert_eq!(request.quality, "high");
        assert_eq!(request.density, 0.2);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let good = JobRequest::new(vec!["https://example.com/a.stl".to_owned()]);
        assert!(good.validate().is_ok());

        assert!(JobRequest::new(vec![]).validate().is_err());
        assert!(JobRequest { count: 0, ..good.clone() }.validate().is_err());
        assert!(JobRequest {
            count: JobRequest::MAX_COUNT,
            ..good.clone()
        }
        .validate()
        .is_ok());
        assert!(JobRequest { scale: 0.0, ..good.clone() }.validate().is_err());
        assert!(JobRequest { scale: f64::NAN, ..good.clone() }.validate().is_err());
        assert!(JobRequest { density: 0.0, ..good.clone() }.validate().is_err());
        assert!(JobRequest { density: 1.5, ..good.clone() }.validate().is_err());
        assert!(JobRequest { density: 1.0, ..good }.validate().is_ok());
    }

    #[test]
    fn test_replicate_is_flat() {
        let request = JobRequest {
            count: 2,
            ..JobRequest::new(vec!["a".to_owned(), "b".to_owned()])
        };
        let fetched = vec![PathBuf::from("fetch-0.stl"), PathBuf::from("fetch-1.stl")];
        assert_eq!(
            request.replicate(&fetched).unwrap(),
            vec![
                PathBuf::from("fetch-0.stl"),
                PathBuf::from("fetch-1.stl"),
                PathBuf::from("fetch-0.stl"),
                PathBuf::from("fetch-1.stl"),
            ]
        );
    }

    #[test]
    fn test_huge_count_is_rejected() {
        let request = JobRequest {
            count: u32::MAX,
            ..JobRequest::new(vec!["a".to_owned(), "b".to_owned()])
        };
        assert!(matches!(request.validate(), Err(Error::InvalidRequest(_))));

        let fetched = vec![PathBuf::from("fetch-0.stl"), PathBuf::from("fetch-1.stl")];
        assert!(matches!(request.replicate(&fetched), Err(Error::InvalidRequest(_))));
    }
}
