//! Binary entry point for the `ebs-snapper` CLI.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use ebs_snapper::{
    AwsCli, ConfigError, ProcessCommandRunner, RunSummary, SnapperConfig, SnapshotWorker,
    WorkerError, WorkerSettings, logging,
};

mod cli;

use cli::{Cli, PlanCommand, SnapshotCommand, TargetArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("snapshot run failed: {0}")]
    Worker(#[from] WorkerError),
    #[error("failed to write output: {0}")]
    Output(String),
}

fn main() {
    let cli = Cli::parse();
    logging::init();
    let exit_code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Snapshot(command) => run_snapshot(&command),
        Cli::Plan(command) => run_plan(&command),
    }
}

fn load_config(target: &TargetArgs) -> Result<SnapperConfig, CliError> {
    let mut config = SnapperConfig::load_without_cli_args()?;
    apply_target_overrides(&mut config, target);
    Ok(config)
}

fn apply_target_overrides(config: &mut SnapperConfig, target: &TargetArgs) {
    if let Some(tag_key) = &target.tag_key {
        config.lifecycle_tag_key.clone_from(tag_key);
    }
    if let Some(profile) = &target.profile {
        config.profile.clone_from(profile);
    }
    if let Some(region) = &target.region {
        config.region = Some(region.clone());
    }
}

fn build_worker(
    config: &SnapperConfig,
) -> Result<SnapshotWorker<AwsCli<ProcessCommandRunner>>, CliError> {
    config.validate()?;
    Ok(SnapshotWorker::new(
        AwsCli::with_process_runner(config.aws_cli_settings()),
        WorkerSettings::from(config),
    ))
}

fn run_snapshot(command: &SnapshotCommand) -> Result<i32, CliError> {
    let mut config = load_config(&command.target)?;
    if let Some(description) = &command.description {
        config.description.clone_from(description);
    }
    if command.execute {
        config.dry_run = false;
    }

    let summary = build_worker(&config)?.run()?;
    emit(&render_summary(&summary, config.dry_run))?;

    if command.fail_on_errors && summary.failed() > 0 {
        return Ok(1);
    }
    Ok(0)
}

fn run_plan(command: &PlanCommand) -> Result<i32, CliError> {
    let config = load_config(&command.target)?;
    let summary = build_worker(&config)?.plan()?;
    emit(&render_plan(&summary))?;
    Ok(0)
}

fn render_summary(summary: &RunSummary, dry_run: bool) -> String {
    format!(
        "snapshot run complete ({mode}): instances={}, skipped={}, candidates={}, exceptions={}, created={}, dry_run_accepted={}, dry_run_denied={}, failed={}",
        summary.instances.len(),
        summary.skipped_instances(),
        summary.candidates(),
        summary.exceptions(),
        summary.created(),
        summary.dry_run_accepted(),
        summary.dry_run_denied(),
        summary.failed(),
        mode = if dry_run { "dry run" } else { "live" },
    )
}

fn render_plan(summary: &RunSummary) -> String {
    let mut out = String::new();
    for report in &summary.instances {
        let label = report.name.as_deref().map_or_else(
            || report.instance_id.clone(),
            |name| format!("{} ({name})", report.instance_id),
        );
        if report.root.is_none() && report.data.is_empty() {
            writeln!(out, "{label}: no EBS-backed devices").ok();
            continue;
        }
        writeln!(out, "{label}").ok();
        for (role, volume) in report
            .root
            .iter()
            .map(|root| ("root", root))
            .chain(report.data.iter().map(|data| ("data", data)))
        {
            writeln!(
                out,
                "  {role} {} {} {}GiB {}",
                volume.volume_id,
                volume.device_name.as_deref().unwrap_or("-"),
                volume.size,
                volume.volume_type
            )
            .ok();
        }
        for candidate in &report.selection.candidates {
            writeln!(
                out,
                "  snapshot {} as \"{}\"",
                candidate.volume_id, candidate.display_name
            )
            .ok();
        }
        for exception in &report.selection.exceptions {
            writeln!(
                out,
                "  exception {}: lifecycle tag {} without Name tag",
                exception.volume_id, exception.lifecycle
            )
            .ok();
        }
    }
    out.trim_end().to_owned()
}

fn emit(text: &str) -> Result<(), CliError> {
    if text.is_empty() {
        return Ok(());
    }
    writeln!(io::stdout(), "{text}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
