//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use jobsync_client::{ClientConfig, HttpResourceClient, ResourceApi, VideoUpload};
use jobsync_engine::{EngineConfig, TaskMonitor, VideoLibrary};
use jobsync_models::{
    CollectionQuery, FrameRange, QueryPatch, TaskId, TaskStatus, TaskType, VideoId, VideoStatus,
};
use tracing::info;

use crate::output;

pub struct Context {
    api: Arc<dyn ResourceApi>,
    config: EngineConfig,
}

impl Context {
    pub fn new(api_url: Option<String>) -> Result<Self> {
        let mut client_config = ClientConfig::from_env();
        if let Some(url) = api_url {
            client_config = client_config.with_base_url(url);
        }
        info!(api_url = %client_config.api_url(), "Using API");

        let client = HttpResourceClient::new(client_config)?;
        Ok(Self {
            api: Arc::new(client),
            config: EngineConfig::from_env(),
        })
    }

    fn api(&self) -> Arc<dyn ResourceApi> {
        Arc::clone(&self.api)
    }
}

pub async fn health(ctx: &Context) -> Result<()> {
    let health = ctx.api.health().await?;
    println!("{}", output::health_line(&health));
    if !health.is_healthy() {
        anyhow::bail!("service reports status {}", health.status);
    }
    Ok(())
}

pub async fn videos(ctx: &Context, status: Option<VideoStatus>, page: u64) -> Result<()> {
    let library = VideoLibrary::new(ctx.api(), &ctx.config);
    if status.is_some() {
        library.set_filter(QueryPatch::status(status)).await?;
    }
    library.set_page(page).await?;

    let state = library.state();
    for video in state.items() {
        println!("{}", output::video_line(video));
    }
    println!("{}", output::page_footer(&state));
    Ok(())
}

pub async fn upload(
    ctx: &Context,
    path: PathBuf,
    content_type: Option<String>,
    process: Option<TaskType>,
) -> Result<()> {
    let mut upload = VideoUpload::from_path(&path)
        .await
        .with_context(|| format!("cannot upload {}", path.display()))?;
    if let Some(content_type) = content_type {
        upload = upload.with_content_type(content_type);
    }

    let library = VideoLibrary::new(ctx.api(), &ctx.config);
    match process {
        None => {
            let receipt = library.upload(upload).await?;
            println!("{}", output::receipt_line(&receipt));
        }
        Some(process_type) => {
            let submission = library.submit(upload, process_type).await?;
            println!("{}", output::receipt_line(&submission.receipt));
            let ticket = submission.processing.with_context(|| {
                format!(
                    "video {} was uploaded but processing could not be started; retry with `jobsync process {}`",
                    submission.receipt.id, submission.receipt.id
                )
            })?;
            println!("{}", output::ticket_line(&ticket));
        }
    }
    Ok(())
}

pub async fn process(ctx: &Context, video_id: String, process_type: TaskType) -> Result<()> {
    let library = VideoLibrary::new(ctx.api(), &ctx.config);
    let ticket = library
        .request_processing(&VideoId::from(video_id), process_type)
        .await?;
    println!("{}", output::ticket_line(&ticket));
    Ok(())
}

fn task_query(ctx: &Context, status: Option<TaskStatus>, task_type: Option<TaskType>) -> CollectionQuery<TaskStatus> {
    let mut query = CollectionQuery::new(ctx.config.page_size);
    if let Some(status) = status {
        query = query.with_status(status);
    }
    if let Some(task_type) = task_type {
        query = query.with_task_type(task_type);
    }
    query
}

pub async fn tasks(
    ctx: &Context,
    status: Option<TaskStatus>,
    task_type: Option<TaskType>,
    page: u64,
) -> Result<()> {
    let monitor = TaskMonitor::with_query(ctx.api(), &ctx.config, task_query(ctx, status, task_type));
    monitor.set_page(page).await?;

    let state = monitor.state();
    for task in state.items() {
        println!("{}", output::task_line(task));
    }
    println!("{}", output::page_footer(&state));
    Ok(())
}

pub async fn watch(
    ctx: &Context,
    status: Option<TaskStatus>,
    task_type: Option<TaskType>,
    select: Option<String>,
) -> Result<()> {
    let monitor = TaskMonitor::with_query(ctx.api(), &ctx.config, task_query(ctx, status, task_type));
    let mut list_rx = monitor.subscribe();
    let mut selection_rx = monitor.subscribe_selection();

    if let Err(e) = monitor.start().await {
        eprintln!("initial load failed: {}; retrying every {:?}", e, ctx.config.poll_interval);
    }
    if let Some(id) = select {
        // Transient failures keep the selection polling; show the error and carry on.
        if let Err(e) = monitor.select(TaskId::from(id.clone())).await {
            eprintln!("cannot load task {}: {}", id, e);
        }
    }

    let mut last_list = None;
    let mut last_selection = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            changed = list_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = list_rx.borrow_and_update().clone();
                if state.loading {
                    continue;
                }
                let rendered = output::list_block(&state);
                if last_list.as_ref() != Some(&rendered) {
                    println!("{}", rendered);
                    last_list = Some(rendered);
                }
            }
            changed = selection_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = selection_rx.borrow_and_update().clone();
                if let Some(rendered) = output::selection_line(&state) {
                    if last_selection.as_ref() != Some(&rendered) {
                        println!("{}", rendered);
                        last_selection = Some(rendered);
                    }
                }
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}

pub async fn status(ctx: &Context, task_id: String) -> Result<()> {
    let monitor = TaskMonitor::new(ctx.api(), &ctx.config);
    let task = monitor.select(TaskId::from(task_id)).await?;
    println!("{}", output::task_detail(&task));
    Ok(())
}

pub async fn cancel(ctx: &Context, task_id: String) -> Result<()> {
    let monitor = TaskMonitor::new(ctx.api(), &ctx.config);
    let ack = monitor.cancel(&TaskId::from(task_id)).await?;
    if ack.message.is_empty() {
        println!("cancelled");
    } else {
        println!("{}", ack.message);
    }
    Ok(())
}

pub async fn detections(ctx: &Context, video_id: String, from: Option<u64>, to: Option<u64>) -> Result<()> {
    let detections = ctx
        .api
        .video_detections(&VideoId::from(video_id), FrameRange::new(from, to))
        .await?;
    for detection in &detections {
        println!("{}", output::detection_line(detection));
    }
    println!("{} detections", detections.len());
    Ok(())
}

pub async fn events(ctx: &Context, video_id: String, event_type: Option<String>) -> Result<()> {
    let events = ctx
        .api
        .video_events(&VideoId::from(video_id), event_type.as_deref())
        .await?;
    for event in &events {
        println!("{}", output::event_line(event));
    }
    println!("{} events", events.len());
    Ok(())
}
