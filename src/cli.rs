//! CLI definitions and command handlers.
//!
//! Uses clap v4 with derive macros for argument parsing. The CLI is a thin
//! driver over [`crate::publish::Publisher`]; the transport is selected
//! once from configuration when the publisher is built.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::bundle::BundleProgress;
use crate::config::Config;
use crate::error::Result;
use crate::publish::{Publisher, PublishStatusResult};
use crate::transport::PublishStatus;

/// Publish locally built apps to a hosting broker
#[derive(Parser, Debug)]
#[command(name = "shipkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to an explicit config file (replaces global/project files)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bundle a project directory and start a publish job
    Publish {
        /// Id of the app being published
        #[arg(long)]
        owner: i64,

        /// Project directory to bundle
        #[arg(long, value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// Show the current status of a publish job
    Status {
        job_id: String,

        /// Keep polling until the job reaches a terminal state
        #[arg(long)]
        watch: bool,

        /// Seconds between polls with --watch
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },

    /// Cancel a publish job
    Cancel { job_id: String },

    /// Print a redacted diagnostic record
    Diagnostics {
        /// Id of the app to report on
        #[arg(long)]
        owner: i64,

        /// Include details for a specific job
        #[arg(long)]
        job_id: Option<String>,
    },
}

pub fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let publisher = Publisher::from_config(&config)?;

    match &cli.command {
        Commands::Publish { owner, dir } => run_publish(&publisher, *owner, dir),
        Commands::Status {
            job_id,
            watch,
            interval,
        } => run_status(&publisher, job_id, *watch, *interval),
        Commands::Cancel { job_id } => run_cancel(&publisher, job_id),
        Commands::Diagnostics { owner, job_id } => {
            run_diagnostics(&publisher, *owner, job_id.as_deref())
        }
    }
}

fn run_publish(publisher: &Publisher, owner: i64, dir: &PathBuf) -> Result<()> {
    let bar = ProgressBar::no_length();
    bar.set_style(ProgressStyle::default_bar());
    bar.set_message("scanning");

    let started = publisher.publish_start_with_progress(owner, dir, |progress| match progress {
        BundleProgress::Scanning => bar.set_message("scanning"),
        BundleProgress::Archiving {
            files_processed,
            total_files,
        } => {
            bar.set_length(total_files as u64);
            bar.set_position(files_processed as u64);
            bar.set_message("archiving");
        }
        BundleProgress::Hashing => bar.set_message("hashing"),
        BundleProgress::Complete => bar.finish_and_clear(),
    })?;

    println!(
        "{} job {} ({})",
        "started".green().bold(),
        started.job_id,
        if started.is_simulated {
            "simulated"
        } else {
            "broker"
        }
    );
    println!("follow with: shipkit status {} --watch", started.job_id);
    Ok(())
}

fn run_status(publisher: &Publisher, job_id: &str, watch: bool, interval: u64) -> Result<()> {
    loop {
        let result = publisher.publish_status(job_id);
        print_status(&result);
        if !watch || result.status.is_terminal() {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(interval.max(1)));
    }
}

fn run_cancel(publisher: &Publisher, job_id: &str) -> Result<()> {
    let result = publisher.publish_cancel(job_id);
    if result.success {
        println!("{} job {}", "cancelled".yellow().bold(), job_id);
    } else {
        println!(
            "{} job {} is already {}",
            "not cancelled:".red().bold(),
            job_id,
            result.status
        );
        if let Some(reason) = result.error_message {
            println!("  {reason}");
        }
    }
    Ok(())
}

fn run_diagnostics(publisher: &Publisher, owner: i64, job_id: Option<&str>) -> Result<()> {
    let report = publisher.publish_diagnostics(job_id, owner);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_status(result: &PublishStatusResult) {
    let label = match result.status {
        PublishStatus::Ready => result.status.as_str().green().bold(),
        PublishStatus::Failed => result.status.as_str().red().bold(),
        PublishStatus::Cancelled => result.status.as_str().yellow().bold(),
        _ => result.status.as_str().cyan(),
    };

    let mut line = format!("{label}");
    if let Some(percent) = result.progress_percent {
        line.push_str(&format!(" {percent}%"));
    }
    if let Some(message) = &result.message {
        line.push_str(&format!(" - {message}"));
    }
    println!("{line}");

    if let Some(url) = &result.live_url {
        println!("  live at: {url}");
    }
    if let Some(error) = &result.error_message {
        println!("  error: {error}");
    }
}
