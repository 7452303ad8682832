use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use tally::cli::{Cli, Commands, LogFormat, parse_cli};
use tally::outputs::{
    append_summary, output_pairs, summary_markdown, write_document, write_outputs,
};
use tally::run_publish;
use tally_config::{
    PublishSettings, ensure_workspace_config, load_config_file, load_workspace_config,
    resolve_settings, resolve_token,
};
use tally_github::{GitHubClient, MemoryStore, RetryPolicy};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = parse_cli();
    init_tracing(cli.log_format);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("::error::{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Human => builder.init(),
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(Commands::Init) = cli.command {
        let (path, created) = ensure_workspace_config(&cli.workspace).with_context(|| {
            format!(
                "failed to create workspace config under {}",
                cli.workspace.display()
            )
        })?;
        if created {
            println!("Created {}", path.display());
        } else {
            println!("{} already exists", path.display());
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => load_workspace_config(&cli.workspace).with_context(|| {
            format!(
                "failed to load workspace config under {}",
                cli.workspace.display()
            )
        })?,
    };
    let overrides = cli.inputs.settings_overrides()?;
    let settings = resolve_settings(&config, overrides, cli.github_repository.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let now = Utc::now();

    let mut stdout = std::io::stdout().lock();
    let report = if cli.dry_run {
        let store = dry_run_store(&cli, &settings)?;
        let report = runtime.block_on(run_publish(&store, &settings, now))?;
        write_document(&report, &mut stdout)?;
        report
    } else {
        let token = resolve_token(cli.inputs.token.as_deref(), cli.github_token.as_deref())?;
        let client = GitHubClient::with_api_base(token, &cli.api_base, RetryPolicy::default())?;
        runtime.block_on(run_publish(&client, &settings, now))?
    };

    write_outputs(
        &output_pairs(&report),
        cli.github_output.as_deref(),
        &mut stdout,
    )?;
    if let Some(path) = &cli.github_step_summary {
        append_summary(path, &summary_markdown(&report))?;
    }

    info!("{}", report.completion_message());
    Ok(())
}

fn dry_run_store(cli: &Cli, settings: &PublishSettings) -> Result<MemoryStore> {
    let store = MemoryStore::public(cli.dry_run_total);
    if let Some(path) = &cli.seed_document {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read seed document {}", path.display()))?;
        store.put_file(&settings.output_path, &settings.output_branch, &content)?;
    }
    Ok(store)
}
