use super::Cli;
use anyhow::Result;
use makeme::config::Config;
use std::process::ExitCode;

pub async fn progress(cli: &Cli, config: Config) -> Result<ExitCode> {
    let progress = super::orchestrator(config).progress().await;
    if cli.json {
        println!("{}", serde_json::json!({ "progress": progress }));
    } else {
        println!("{}", progress);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn log(config: Config) -> Result<ExitCode> {
    print!("{}", super::orchestrator(config).log().await?);
    Ok(ExitCode::SUCCESS)
}

pub async fn status(cli: &Cli, config: Config) -> Result<ExitCode> {
    let status = super::orchestrator(config).status().await?;
    if cli.json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(ExitCode::SUCCESS);
    }

    match status.owner {
        Some(owner) => match owner.since {
            Some(since) => println!(
                "printing (pid {}, since {}), {}% done",
                owner.pid,
                since.to_rfc3339(),
                status.progress
            ),
            None => println!("printing (pid {}), {}% done", owner.pid, status.progress),
        },
        None => println!("idle"),
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn unlock(config: Config) -> Result<ExitCode> {
    super::orchestrator(config).release().await?;
    tracing::info!("print slot released");
    Ok(ExitCode::SUCCESS)
}

pub async fn current_model(config: Config) -> Result<ExitCode> {
    match super::orchestrator(config).current_model().await {
        Some(path) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("not found");
            Ok(ExitCode::FAILURE)
        }
    }
}
