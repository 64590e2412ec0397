//! `jobsync` command-line front-end.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobsync_models::{TaskStatus, TaskType, VideoStatus};

#[derive(Parser, Debug)]
#[command(name = "jobsync", version, about = "Follow video uploads and processing tasks")]
struct Cli {
    /// API prefix of the platform
    #[arg(long, global = true, env = "JOBSYNC_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the API is reachable
    Health,

    /// List uploaded videos
    Videos {
        #[arg(short, long)]
        status: Option<VideoStatus>,
        /// Zero-based page index
        #[arg(short, long, default_value_t = 0)]
        page: u64,
    },

    /// Upload a video file, optionally requesting processing right away
    Upload {
        path: PathBuf,
        /// Declared media type; inferred from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
        /// Request processing of this type after the upload
        #[arg(long)]
        process: Option<TaskType>,
    },

    /// Request processing of an uploaded video
    Process {
        video_id: String,
        #[arg(short = 't', long = "type", default_value_t = TaskType::Analysis)]
        process_type: TaskType,
    },

    /// List processing tasks
    Tasks {
        #[arg(short, long)]
        status: Option<TaskStatus>,
        #[arg(short = 't', long = "type")]
        task_type: Option<TaskType>,
        #[arg(short, long, default_value_t = 0)]
        page: u64,
    },

    /// Poll the task list until Ctrl-C, printing every change
    Watch {
        #[arg(short, long)]
        status: Option<TaskStatus>,
        #[arg(short = 't', long = "type")]
        task_type: Option<TaskType>,
        /// Also follow this task until it finishes
        #[arg(long)]
        select: Option<String>,
    },

    /// Show one task
    Status { task_id: String },

    /// Cancel a pending, queued or running task
    Cancel { task_id: String },

    /// Object detections of a video
    Detections {
        video_id: String,
        /// First frame, inclusive
        #[arg(long)]
        from: Option<u64>,
        /// Last frame, inclusive
        #[arg(long)]
        to: Option<u64>,
    },

    /// Events found in a video
    Events {
        video_id: String,
        #[arg(short = 't', long = "type")]
        event_type: Option<String>,
    },
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    debug!(command = ?cli.command, "Starting jobsync");

    let ctx = match commands::Context::new(cli.api_url) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to create API client: {}", e);
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Health => commands::health(&ctx).await,
        Command::Videos { status, page } => commands::videos(&ctx, status, page).await,
        Command::Upload {
            path,
            content_type,
            process,
        } => commands::upload(&ctx, path, content_type, process).await,
        Command::Process {
            video_id,
            process_type,
        } => commands::process(&ctx, video_id, process_type).await,
        Command::Tasks {
            status,
            task_type,
            page,
        } => commands::tasks(&ctx, status, task_type, page).await,
        Command::Watch {
            status,
            task_type,
            select,
        } => commands::watch(&ctx, status, task_type, select).await,
        Command::Status { task_id } => commands::status(&ctx, task_id).await,
        Command::Cancel { task_id } => commands::cancel(&ctx, task_id).await,
        Command::Detections { video_id, from, to } => {
            commands::detections(&ctx, video_id, from, to).await
        }
        Command::Events {
            video_id,
            event_type,
        } => commands::events(&ctx, video_id, event_type).await,
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
