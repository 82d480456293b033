//! Support for the bounding/scaling tool (stltwalker), which packs every
//! input into a single model that fits the printable volume.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};
use tokio::process::Command;

use crate::{config::NormalizeConfig, JobLog, Volume};

/// Build the argument list for the normalize tool.
pub fn args(
    config: &NormalizeConfig,
    bounds: &Volume,
    scale: f64,
    output: &Path,
    inputs: &[PathBuf],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.args.iter().map(OsString::from).collect();
    args.push("-p".into());
    for (flag, limit) in [("-L", bounds.width), ("-W", bounds.depth), ("-H", bounds.height)] {
        args.push(flag.into());
        args.push(format!("{:?}", limit).into());
    }
    args.push("-o".into());
    args.push(output.into());
    args.push(format!("--scale={:?}", scale).into());
    args.extend(inputs.iter().map(OsString::from));
    args
}

/// Normalize `inputs` into `output`, blocking until the tool exits.
///
/// The job log is truncated first; this is the first stage of a job to
/// write to it.
#[tracing::instrument(skip_all, fields(program = ?config.program, inputs = inputs.len()))]
pub async fn run(
    config: &NormalizeConfig,
    bounds: &Volume,
    scale: f64,
    output: &Path,
    inputs: &[PathBuf],
    log: &JobLog,
) -> io::Result<ExitStatus> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let stdout = log.truncate()?;
    let stderr = stdout.try_clone()?;

    let status = Command::new(&config.program)
        .args(args(config, bounds, scale, output, inputs))
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .await?;

    if status.success() {
        tracing::info!(output = format!("{:?}", output), "model normalized");
    } else {
        tracing::warn!(status = format!("{}", status), "model normalize failed");
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args() {
        let bounds = Volume {
            width: 285.0,
            depth: 153.0,
            height: 155.0,
        };
        let inputs = vec![PathBuf::from("data/fetch-0.stl"), PathBuf::from("data/fetch-1.stl")];

        let args = args(&NormalizeConfig::default(), &bounds, 1.5, Path::new("data/print.stl"), &inputs);
        assert_eq!(
            args,
            vec![
                "-p",
                "-L",
                "285.0",
                "-W",
                "153.0",
                "-H",
                "155.0",
                "-o",
                "data/print.stl",
                "--scale=1.5",
                "data/fetch-0.stl",
                "data/fetch-1.stl",
            ]
            .into_iter()
            .map(OsString::from)
            .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_run_truncates_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::new(&dir.path().join("make.log"));
        std::fs::write(log.path(), "previous job\n").unwrap();

        let config = NormalizeConfig {
            program: PathBuf::from("echo"),
            args: vec![],
        };
        let bounds = Volume {
            width: 1.0,
            depth: 2.0,
            height: 3.0,
        };
        let output = dir.path().join("data").join("print.stl");

        let status = run(&config, &bounds, 1.0, &output, &[PathBuf::from("in.stl")], &log)
            .await
            .unwrap();
        assert!(status.success());

        let text = log.read().await.unwrap();
        assert!(!text.contains("previous job"));
        assert!(text.contains("-L 1.0 -W 2.0 -H 3.0"));
        assert!(text.trim_end().ends_with("--scale=1.0 in.stl"));
    }

    #[tokio::test]
    async fn test_run_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::new(&dir.path().join("make.log"));
        let config = NormalizeConfig {
            program: PathBuf::from("false"),
            args: vec![],
        };
        let bounds = Volume {
            width: 1.0,
            depth: 1.0,
            height: 1.0,
        };

        let status = run(&config, &bounds, 1.0, &dir.path().join("print.stl"), &[], &log)
            .await
            .unwrap();
        assert!(!status.success());
    }
}
