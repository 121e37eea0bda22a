//! Command-line interface definitions for the `ebs-snapper` binary.
//!
//! This module only depends on clap so the build script can reuse it when
//! generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `ebs-snapper` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ebs-snapper",
    about = "Snapshot lifecycle-tagged EBS data volumes of tagged EC2 instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Request snapshots of every eligible data volume.
    #[command(name = "snapshot", about = "Request snapshots of eligible data volumes")]
    Snapshot(SnapshotCommand),
    /// Show the classification and candidates without requesting snapshots.
    #[command(name = "plan", about = "Show which volumes would be snapshotted")]
    Plan(PlanCommand),
}

/// Options selecting the account and the lifecycle tag.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Lifecycle tag key selecting instances and volumes.
    #[arg(long, value_name = "KEY")]
    pub(crate) tag_key: Option<String>,
    /// AWS credentials profile.
    #[arg(long, value_name = "PROFILE")]
    pub(crate) profile: Option<String>,
    /// AWS region.
    #[arg(long, value_name = "REGION")]
    pub(crate) region: Option<String>,
}

/// Arguments for the `ebs-snapper snapshot` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct SnapshotCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Description attached to every snapshot of this run.
    #[arg(long, value_name = "TEXT")]
    pub(crate) description: Option<String>,
    /// Create snapshots for real instead of validating with a dry run.
    #[arg(long)]
    pub(crate) execute: bool,
    /// Exit with status 1 when any snapshot request fails.
    #[arg(long)]
    pub(crate) fail_on_errors: bool,
}

/// Arguments for the `ebs-snapper plan` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct PlanCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
}
