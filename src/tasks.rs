//! Running stored tasks and keeping their history.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{info, warn};

use crate::align::RowRecord;
use crate::assist::{AssistContext, propose_selectors};
use crate::batch::extract_document;
use crate::document::Document;
use crate::error::CollaboratorError;
use crate::fetch::Fetcher;
use crate::selector::FieldDescriptor;
use crate::storage::{Storage, Task, TaskRun};

/// Fetches the task page, settles its selectors and extracts rows.
///
/// Pinned selectors are used as is; otherwise the model is asked for one
/// selector per requested field name. Every failure ends up in the returned
/// run rather than in an `Err`.
pub async fn run_task(
    task: &Task,
    fetcher: &Fetcher,
    assist: Option<&AssistContext<'_>>,
) -> TaskRun {
    info!("Running task {} ({})", task.id, task.name);
    match try_run_task(task, fetcher, assist).await {
        Ok((rows, field_errors)) => {
            let rows_json = serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_owned());
            TaskRun {
                task_id: task.id.clone(),
                ran_at: Utc::now(),
                success: true,
                total: rows.len(),
                error: (!field_errors.is_empty()).then(|| field_errors.join("; ")),
                rows: rows_json,
            }
        }
        Err(err) => {
            warn!("Task {} failed: {err:#}", task.id);
            TaskRun {
                task_id: task.id.clone(),
                ran_at: Utc::now(),
                success: false,
                total: 0,
                error: Some(format!("{err:#}")),
                rows: "[]".to_owned(),
            }
        }
    }
}

async fn try_run_task(
    task: &Task,
    fetcher: &Fetcher,
    assist: Option<&AssistContext<'_>>,
) -> Result<(Vec<RowRecord>, Vec<String>)> {
    let loaded = fetcher.load(task.source_url.as_str()).await;
    let html = match loaded.html {
        Ok(html) => html,
        Err(message) => bail!("Unable to load {}: {message}", loaded.source),
    };

    let fields = task_fields(task, &html, assist).await?;
    let document = Document::parse(html);
    let extraction = extract_document(&document, &fields);

    let field_errors = extraction
        .field_errors
        .iter()
        .map(|field_error| format!("{}: {}", field_error.label, field_error.error))
        .collect();

    Ok((extraction.rows, field_errors))
}

async fn task_fields(
    task: &Task,
    html: &str,
    assist: Option<&AssistContext<'_>>,
) -> Result<Vec<FieldDescriptor>> {
    if let Some(selectors) = &task.selectors {
        return Ok(selectors.clone());
    }

    let ctx = assist.ok_or_else(|| {
        CollaboratorError::Unavailable("task has no pinned selectors, pass --model".to_owned())
    })?;
    let proposal = propose_selectors(html, &task.fields.join(", "), ctx).await?;
    if proposal.fields.is_empty() {
        bail!("Model proposed no selectors");
    }
    Ok(proposal.fields)
}

/// Runs a stored task and records the run in its history.
///
/// # Errors
///
/// Returns an error if the task does not exist or the history cannot be written
pub async fn run_stored_task(
    storage: &Storage,
    task_id: &str,
    fetcher: &Fetcher,
    assist: Option<&AssistContext<'_>>,
) -> Result<TaskRun> {
    let task = storage
        .get_task(task_id)?
        .with_context(|| format!("Task {task_id} not found"))?;
    if !task.enabled {
        warn!("Task {task_id} is disabled, running it anyway");
    }

    let run = run_task(&task, fetcher, assist).await;
    storage.record_run(&run)?;
    Ok(run)
}

/// Runs every enabled task in creation order.
///
/// # Errors
///
/// Returns an error if tasks cannot be listed or history cannot be written
pub async fn run_enabled_tasks(
    storage: &Storage,
    fetcher: &Fetcher,
    assist: Option<&AssistContext<'_>>,
) -> Result<Vec<TaskRun>> {
    let mut runs = Vec::new();
    for task in storage.list_tasks()?.into_iter().filter(|task| task.enabled) {
        let run = run_task(&task, fetcher, assist).await;
        storage.record_run(&run)?;
        runs.push(run);
    }

    info!(
        "Ran {} tasks, {} failed",
        runs.len(),
        runs.iter().filter(|run| !run.success).count()
    );
    Ok(runs)
}
