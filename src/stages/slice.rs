//! Support for the slice-and-print driver, a `make` style build that
//! slices the current model and streams it to the printer.
//!
//! The driver can run far longer than anything that starts it, so it is
//! wrapped in a small shell script that removes the lock record once the
//! driver exits, whatever its exit status, as long as the record still
//! names the wrapper.

use std::{ffi::OsString, io, path::Path, process::Stdio};
use tokio::process::{Child, Command};

use crate::{config::SliceConfig, JobLog, JobRequest};

/// Runs the driver with all positional arguments, then removes the lock
/// record named by `$MAKEME_LOCK` if it holds the wrapper's own pid, and
/// exits with the driver's status.
const SELF_RELEASE: &str = r#""$@"
status=$?
if [ "$(cat -- "$MAKEME_LOCK" 2>/dev/null)" = "$$" ]; then
    rm -f -- "$MAKEME_LOCK"
fi
exit $status"#;

/// Environment variable the wrapper reads the lock path from.
pub const LOCK_ENV: &str = "MAKEME_LOCK";

/// Build the driver's own arguments: any configured leading arguments,
/// then the slicer settings as `make` variables, then the build target.
pub fn driver_args(config: &SliceConfig, request: &JobRequest, model: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.args.iter().map(OsString::from).collect();
    args.push(format!("GRUE_CONFIG={}", request.profile).into());
    args.push(format!("QUALITY={}", request.quality).into());
    args.push(format!("DENSITY={:?}", request.density).into());
    args.push(model.with_extension("").into());
    args
}

/// Build the (unspawned) wrapped driver command.
pub fn command(config: &SliceConfig, request: &JobRequest, model: &Path, lock: &Path) -> io::Result<Command> {
    let model = std::path::absolute(model)?;
    let lock = std::path::absolute(lock)?;

    let mut command = std::process::Command::new("sh");
    command
        .arg("-c")
        .arg(SELF_RELEASE)
        .arg("makeme-slice")
        .arg(&config.program)
        .args(driver_args(config, request, &model))
        .env(LOCK_ENV, lock)
        .stdin(Stdio::null());

    if let Some(working_dir) = &config.working_dir {
        command.current_dir(working_dir);
    }

    // Keep the driver out of our process group, so it isn't taken down
    // with the terminal that started it.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    Ok(command.into())
}

/// Start slicing and printing `model` in the background, appending its
/// output to the job log. Returns as soon as the process is started.
#[tracing::instrument(skip_all, fields(program = ?config.program, model = ?model))]
pub fn spawn(config: &SliceConfig, request: &JobRequest, model: &Path, lock: &Path, log: &JobLog) -> io::Result<Child> {
    let stdout = log.append()?;
    let stderr = stdout.try_clone()?;

    let child = command(config, request, model, lock)?
        .stdout(stdout)
        .stderr(stderr)
        .spawn()?;

    tracing::info!(pid = child.id(), "slice-and-print started");
    Ok(child)
}
