use super::Cli;
use anyhow::{Context, Result};
use makeme::{config::Config, JobRequest};
use std::{io::Read, path::PathBuf, process::ExitCode};

/// Arguments for `makeme print`.
#[derive(clap::Args, Debug)]
pub struct PrintArgs {
    /// Urls of the models to print.
    #[arg(required_unless_present = "request")]
    urls: Vec<String>,

    /// Read the whole job request as json from this file (`-` for stdin)
    /// instead of from the arguments.
    #[arg(long, conflicts_with = "urls")]
    request: Option<PathBuf>,

    /// Number of copies of the whole set of models to print.
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Scale factor applied to every model.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Slicer profile to use.
    #[arg(long, default_value = "default")]
    profile: String,

    /// Slicer quality preset.
    #[arg(long, default_value = "medium")]
    quality: String,

    /// Infill density, in (0, 1].
    #[arg(long, default_value_t = 0.05)]
    density: f64,
}

impl PrintArgs {
    fn job_request(&self) -> Result<JobRequest> {
        let Some(path) = &self.request else {
            return Ok(JobRequest {
                count: self.count,
                scale: self.scale,
                profile: self.profile.clone(),
                quality: self.quality.clone(),
                density: self.density,
                ..JobRequest::new(self.urls.clone())
            });
        };

        let body = if path.as_os_str() == "-" {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            body
        } else {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
        };
        Ok(serde_json::from_str(&body)?)
    }
}

pub async fn main(cli: &Cli, config: Config, args: &PrintArgs) -> Result<ExitCode> {
    let request = args.job_request()?;
    let orchestrator = super::orchestrator(config);

    let outcome = match orchestrator.submit(&request).await {
        Ok(outcome) => outcome,
        Err(err) => {
            let code = err.status_code();
            let err = anyhow::Error::from(err);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "error",
                        "code": code.as_u16(),
                        "message": format!("{:#}", err),
                    })
                );
            } else {
                println!("{} {:#}", code, err);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.json {
        let mut body = serde_json::to_value(outcome)?;
        body["code"] = outcome.status_code().as_u16().into();
        body["message"] = outcome.message().into();
        println!("{}", body);
    } else {
        println!("{} {}", outcome.status_code(), outcome.message());
    }

    Ok(match outcome {
        makeme::JobOutcome::Printing { .. } => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_args() {
        let cli = Cli::parse_from([
            "makeme",
            "print",
            "https://example.com/a.stl",
            "https://example.com/b.stl",
            "--count",
            "2",
            "--quality",
            "high",
        ]);
        let super::super::Commands::Print(args) = cli.command else {
            panic!("expected print");
        };
        let request = args.job_request().unwrap();
        assert_eq!(request.urls.len(), 2);
        assert_eq!(request.count, 2);
        assert_eq!(request.quality, "high");
        assert_eq!(request.profile, "default");
        assert_eq!(request.density, 0.05);
    }

    #[test]
    fn test_print_requires_urls() {
        assert!(Cli::try_parse_from(["makeme", "print"]).is_err());
    }

    #[test]
    fn test_print_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, r#"{"url": "https://example.com/a.stl", "scale": 2.0}"#).unwrap();

        let cli = Cli::parse_from(["makeme", "print", "--request", path.to_str().unwrap()]);
        let super::super::Commands::Print(args) = cli.command else {
            panic!("expected print");
        };
        let request = args.job_request().unwrap();
        assert_eq!(request.urls, vec!["https://example.com/a.stl"]);
        assert_eq!(request.scale, 2.0);
    }
}
