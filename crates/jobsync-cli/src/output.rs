//! Plain-text rendering of records and engine state.

use jobsync_client::format_bytes;
use jobsync_engine::{SelectionState, ViewState};
use jobsync_models::{
    Detection, Event, HealthStatus, Resource, Task, TaskOutcome, TaskTicket, UploadReceipt, Video,
};

const BAR_WIDTH: usize = 20;

fn progress_bar(progress: f64) -> String {
    let filled = ((progress.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

pub fn health_line(health: &HealthStatus) -> String {
    let mut line = health.status.clone();
    if let Some(service) = &health.service {
        line.push_str(&format!(" ({}", service));
        if let Some(version) = &health.version {
            line.push_str(&format!(" {}", version));
        }
        line.push(')');
    }
    line
}

pub fn video_line(video: &Video) -> String {
    let size = video.file_size.map(format_bytes).unwrap_or_else(|| "-".to_string());
    format!(
        "{:>6}  {:<10}  {:>10}  {}",
        video.id.as_str(),
        video.status.as_str(),
        size,
        video.display_name()
    )
}

pub fn task_line(task: &Task) -> String {
    let task_type = task.task_type.map(|t| t.as_str()).unwrap_or("-");
    format!(
        "{:<8}  {:<10}  {:<10}  {} {:>5.1}%",
        task.task_id.short(),
        task.status.as_str(),
        task_type,
        progress_bar(task.progress),
        task.progress
    )
}

pub fn task_detail(task: &Task) -> String {
    let mut lines = vec![
        format!("task      {}", task.task_id),
        format!("status    {}", task.status),
        format!("progress  {} {:.1}%", progress_bar(task.progress), task.progress),
        format!("created   {}", task.created_at.format("%Y-%m-%d %H:%M:%S")),
        format!("updated   {}", task.updated_at.format("%Y-%m-%d %H:%M:%S")),
    ];
    if let Some(video_id) = &task.video_id {
        lines.push(format!("video     {}", video_id));
    }
    match task.outcome() {
        TaskOutcome::Success(result) => lines.push(format!("result    {}", result)),
        TaskOutcome::Failure(message) => lines.push(format!("error     {}", message)),
        TaskOutcome::None => {}
    }
    lines.join("\n")
}

pub fn page_footer<R: Resource>(state: &ViewState<R>) -> String {
    let mut footer = format!(
        "page {}/{} ({} total)",
        state.page() + 1,
        state.page_count(),
        state.snapshot.total
    );
    if let Some(error) = &state.error {
        footer.push_str(&format!("  ! {}", error));
    }
    footer
}

pub fn list_block(state: &ViewState<Task>) -> String {
    let mut lines: Vec<String> = state.items().iter().map(task_line).collect();
    if lines.is_empty() {
        lines.push("(no tasks)".to_string());
    }
    lines.push(page_footer(state));
    lines.join("\n")
}

/// One line for the followed task, or `None` while nothing is selected
/// and no error is pending.
pub fn selection_line(state: &SelectionState) -> Option<String> {
    match (&state.record, &state.error) {
        (Some(task), None) => {
            let mut line = format!("> {}", task_line(task));
            if let TaskOutcome::Failure(message) = task.outcome() {
                line.push_str(&format!("  {}", message));
            }
            Some(line)
        }
        (Some(task), Some(error)) => Some(format!("> {}  ! {}", task_line(task), error)),
        (None, Some(error)) => Some(format!("> ! {}", error)),
        (None, None) => None,
    }
}

pub fn receipt_line(receipt: &UploadReceipt) -> String {
    format!("uploaded video {} as {} ({})", receipt.id, receipt.filename, receipt.status)
}

pub fn ticket_line(ticket: &TaskTicket) -> String {
    format!("started task {} ({})", ticket.task_id, ticket.status)
}

pub fn detection_line(detection: &Detection) -> String {
    let at = detection
        .timestamp
        .map(|t| format!("{:.2}s", t))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "frame {:>6}  {:>8}  {} objects",
        detection.frame_number,
        at,
        detection.objects.len()
    )
}

pub fn event_line(event: &Event) -> String {
    let frame = event
        .frame_number
        .map(|f| f.to_string())
        .unwrap_or_else(|| "-".to_string());
    let confidence = event
        .confidence
        .map(|c| format!("{:.0}%", c * 100.0))
        .unwrap_or_else(|| "-".to_string());
    format!("{:<16}  frame {:>6}  {}", event.event_type, frame, confidence)
}
