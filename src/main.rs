use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use nota::cli::{Cli, Target};
use nota::config::Settings;
use nota::console::ConsoleReporter;
use nota::image;
use nota::ota::{Session, Timings, UpdateRequest};
use nota::OtaError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("    {}", format!("{:#}", e).red());
            let code = e
                .downcast_ref::<OtaError>()
                .map(OtaError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let settings_path = settings_path(cli);
    let remembered = match &settings_path {
        Some(path) => Settings::load(path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring remembered settings: {}", e);
            Settings::default()
        }),
        None => Settings::default(),
    };

    let target = cli.resolve(&remembered)?;
    let reporter = ConsoleReporter::new(cli.timestamp);

    let image = image::prepare(&target.file, &cli.objcopy, &reporter).await?;

    if !cli.no_remember {
        if let Some(path) = &settings_path {
            remember(path, &remembered, &target);
        }
    }

    let request = UpdateRequest::new(
        target.host.clone(),
        target.port,
        target.kind,
        image.path_str(),
        image.data,
        target.password.clone(),
    );

    Session::new(&request, Timings::default(), &reporter)
        .run()
        .await?;

    Ok(())
}

fn settings_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = &cli.settings {
        return Some(path.clone());
    }
    match Settings::default_path() {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!("{}", e);
            None
        }
    }
}

fn remember(path: &std::path::Path, remembered: &Settings, target: &Target) {
    let latest = remembered.merged(&Settings {
        host: Some(target.host.clone()),
        port: Some(target.port),
        file: Some(target.file.clone()),
    });
    if latest == *remembered {
        return;
    }
    if let Err(e) = latest.save(path) {
        tracing::warn!("Failed to remember settings: {}", e);
    }
}
