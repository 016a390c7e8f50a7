//! htmlsift is a CLI tool that extracts tables from HTML pages using CSS or
//! XPath selectors, written by hand or proposed by an LLM.
//!
//! The main commands are:
//! 1. `extract` - Applies fields to one page and prints the aligned rows
//! 2. `batch` - Applies the same fields to many pages
//! 3. `suggest` / `ask` - Let a model propose selectors or read the values itself
//! 4. `task` - Stores pages to re-extract on demand, with run history

use std::fs;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use env_logger::Builder;
use llm::builder::{LLMBackend, LLMBuilder};
use log::{LevelFilter, info, warn};
use url::Url;

use htmlsift::assist::{
    AssistContext, extract_direct, mask_api_key, propose_selectors, rate_limiter,
};
use htmlsift::batch::{BatchStatus, extract_document, run_batch_with_progress};
use htmlsift::constants::{
    DEFAULT_FETCH_TIMEOUT_SECS, MODEL_API_KEY_ENV_NAME, PROVIDER_API_KEY_ENV_NAMES,
};
use htmlsift::export::{export_batch, export_extraction, export_rows};
use htmlsift::fetch::{FetchOptions, Fetcher};
use htmlsift::inspect::{inspect_page, probe_selectors};
use htmlsift::storage::{Storage, Task};
use htmlsift::tasks::{run_enabled_tasks, run_stored_task};
use htmlsift::{Document, ExportFormat, ExtractionIntent, FieldDescriptor, sanitize};

/// A CLI tool to extract tables from HTML pages with CSS/XPath selectors
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The command to execute
    #[command(subcommand)]
    command: Command,

    #[arg(long, short, action = clap::ArgAction::Count, help = "Output v(v...)erbosity: error (0), warn (1), info (2), debug (3), trace (4)", global = true, default_value_t = 2)]
    verbose: u8,
}

#[derive(Args)]
struct FetchArgs {
    /// Route requests through a public CORS proxy
    #[arg(long)]
    proxy: bool,
    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    timeout: u64,
}

impl FetchArgs {
    fn fetcher(&self) -> Result<Fetcher> {
        Fetcher::new(FetchOptions {
            proxy: self.proxy,
            timeout: Duration::from_secs(self.timeout),
        })
    }
}

#[derive(Args)]
struct FieldArgs {
    /// Field as LABEL=SELECTOR, repeatable. A CSS selector may end with @attribute
    #[arg(long = "field", short = 'f')]
    fields: Vec<FieldDescriptor>,
    /// JSON file with a list of fields, as written by `suggest --save`
    #[arg(long)]
    fields_file: Option<String>,
}

impl FieldArgs {
    fn collect(&self) -> Result<Vec<FieldDescriptor>> {
        let mut fields = match &self.fields_file {
            Some(file) => read_fields_file(file)?,
            None => Vec::new(),
        };
        fields.extend(self.fields.iter().cloned());
        Ok(fields)
    }

    fn descriptors(&self) -> Result<Vec<FieldDescriptor>> {
        let fields = self.collect()?;
        if fields.is_empty() {
            bail!("Specify at least one --field or --fields-file");
        }
        Ok(fields)
    }
}

#[derive(Args)]
struct OutputArgs {
    /// Output format: "csv" (default) or "json"
    #[arg(long, default_value = "csv")]
    format: ExportFormat,
    /// Path to write the output to instead of stdout
    #[arg(long, short)]
    output: Option<String>,
}

#[derive(Args)]
struct ModelArgs {
    /// URL of the LLM model to use, e.g. openai://gpt-4o-mini
    #[arg(long, short)]
    model: String,
    /// Rate limit: requests per minute (default: no limit)
    #[arg(long, short = 'r')]
    rpm: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract fields from one page (URL or file)
    Extract {
        source: String,
        #[command(flatten)]
        fields: FieldArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Extract the same fields from many pages
    Batch {
        /// URLs or files to extract from
        sources: Vec<String>,
        /// File with one URL or path per line
        #[arg(long)]
        sources_file: Option<String>,
        /// Number of concurrent fetches
        #[arg(long, short, default_value_t = 1)]
        concurrency: usize,
        #[command(flatten)]
        fields: FieldArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Test selectors against a page and show what each one matches
    Probe {
        source: String,
        /// Selectors to test
        selectors: Vec<String>,
        /// File with one selector per line
        #[arg(long)]
        selectors_file: Option<String>,
        /// Report this attribute instead of the text
        #[arg(long)]
        attribute: Option<String>,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Show the structure of a page: tags, classes, ids
    Inspect {
        source: String,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Print a page without scripts, styles and tracking noise
    Sanitize {
        source: String,
        /// Path to write the output to instead of stdout
        #[arg(long, short)]
        output: Option<String>,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Ask a model to propose selectors for a natural-language request
    Suggest {
        source: String,
        /// What to extract, e.g. "product names and prices"
        query: String,
        #[command(flatten)]
        model: ModelArgs,
        /// Save proposed fields as JSON for --fields-file
        #[arg(long)]
        save: Option<String>,
        /// Apply the proposed selectors and print the rows
        #[arg(long)]
        extract: bool,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Ask a model to read the requested values directly
    Ask {
        source: String,
        /// What to extract, e.g. "title, author and publication date"
        query: String,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Manage stored extraction tasks
    Task {
        /// Path to database file to store tasks and their history
        db: String,
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Store a new task
    Add {
        name: String,
        /// Page to extract from
        url: String,
        /// Field name for the model to find a selector for, repeatable
        #[arg(long = "want", short = 'w')]
        wants: Vec<String>,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// List stored tasks
    List,
    /// Remove a task and its history
    Remove { id: String },
    /// Enable a task
    Enable { id: String },
    /// Disable a task
    Disable { id: String },
    /// Run one task, or every enabled task when no id is given
    Run {
        id: Option<String>,
        /// URL of the LLM model for tasks without pinned selectors
        #[arg(long, short)]
        model: Option<String>,
        /// Rate limit: requests per minute (default: no limit)
        #[arg(long, short = 'r')]
        rpm: Option<u32>,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Show recent runs
    History {
        id: Option<String>,
        #[arg(long, short, default_value_t = 5)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .init();

    match cli.command {
        Command::Extract {
            source,
            fields,
            output,
            fetch,
        } => handle_extract_command(&source, &fields, &output, &fetch).await,
        Command::Batch {
            sources,
            sources_file,
            concurrency,
            fields,
            output,
            fetch,
        } => {
            handle_batch_command(
                sources,
                sources_file,
                concurrency,
                &fields,
                &output,
                &fetch,
            )
            .await
        }
        Command::Probe {
            source,
            selectors,
            selectors_file,
            attribute,
            fetch,
        } => handle_probe_command(&source, selectors, selectors_file, attribute, &fetch).await,
        Command::Inspect { source, fetch } => {
            let document = Document::parse(load_html(&fetch, &source).await?);
            println!("{}", inspect_page(&document));
            Ok(())
        }
        Command::Sanitize {
            source,
            output,
            fetch,
        } => {
            let html = load_html(&fetch, &source).await?;
            emit(output.as_deref(), &sanitize(&html))
        }
        Command::Suggest {
            source,
            query,
            model,
            save,
            extract,
            output,
            fetch,
        } => {
            handle_suggest_command(&source, &query, &model, save, extract, &output, &fetch).await
        }
        Command::Ask {
            source,
            query,
            model,
            output,
            fetch,
        } => handle_ask_command(&source, &query, &model, &output, &fetch).await,
        Command::Task { db, command } => handle_task_command(&db, command).await,
    }
}

async fn handle_extract_command(
    source: &str,
    fields: &FieldArgs,
    output: &OutputArgs,
    fetch: &FetchArgs,
) -> Result<()> {
    let fields = fields.descriptors()?;
    let document = Document::parse(load_html(fetch, source).await?);
    let extraction = extract_document(&document, &fields);

    for field_error in &extraction.field_errors {
        warn!("{}: {}", field_error.label, field_error.error.marker());
    }
    info!("Extracted {} rows from {source}", extraction.rows.len());

    let content = export_extraction(&output.format, &extraction)?;
    emit(output.output.as_deref(), &content)
}

async fn handle_batch_command(
    mut sources: Vec<String>,
    sources_file: Option<String>,
    concurrency: usize,
    fields: &FieldArgs,
    output: &OutputArgs,
    fetch: &FetchArgs,
) -> Result<()> {
    let fields = fields.descriptors()?;
    if let Some(file) = sources_file {
        sources.extend(read_lines(&file)?);
    }
    if sources.is_empty() {
        bail!("Specify at least one source or --sources-file");
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_cancel = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with the documents processed so far");
            signal_cancel.store(true, Ordering::Relaxed);
        }
    });

    let fetcher = fetch.fetcher()?;
    let documents = fetcher.load_all(&sources, concurrency, &cancel).await;

    let mut result = run_batch_with_progress(&documents, &fields, |progress| {
        info!(
            "[{}/{}] {} {}",
            progress.index,
            progress.total,
            progress.source,
            if progress.failed { "failed" } else { "done" }
        );
        if cancel.load(Ordering::Relaxed) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    result.cancelled |= documents.len() < sources.len();

    match result.status() {
        BatchStatus::Complete => info!("All {} documents processed", result.outcomes.len()),
        BatchStatus::Partial { failed, total } => warn!("{failed} of {total} documents failed"),
        BatchStatus::Empty => warn!("Every document failed, no rows extracted"),
    }
    if result.cancelled {
        warn!(
            "Batch cancelled, {} of {} sources processed",
            result.outcomes.len(),
            sources.len()
        );
    }

    let content = export_batch(&output.format, &result)?;
    emit(output.output.as_deref(), &content)
}

async fn handle_probe_command(
    source: &str,
    mut selectors: Vec<String>,
    selectors_file: Option<String>,
    attribute: Option<String>,
    fetch: &FetchArgs,
) -> Result<()> {
    if let Some(file) = selectors_file {
        selectors.extend(read_lines(&file)?);
    }
    if selectors.is_empty() {
        bail!("Specify at least one selector or --selectors-file");
    }

    let intent = attribute.map_or(ExtractionIntent::Text, ExtractionIntent::Attribute);
    let document = Document::parse(load_html(fetch, source).await?);

    for (index, probe) in probe_selectors(&document, &selectors, &intent)
        .iter()
        .enumerate()
    {
        println!(
            "{}. [{}] {} => {} match(es): {}",
            index + 1,
            probe.kind,
            probe.selector,
            probe.total,
            probe.first_value
        );
    }
    Ok(())
}

async fn handle_suggest_command(
    source: &str,
    query: &str,
    model_args: &ModelArgs,
    save: Option<String>,
    extract: bool,
    output: &OutputArgs,
    fetch: &FetchArgs,
) -> Result<()> {
    let html = load_html(fetch, source).await?;
    let model = llm_builder(&model_args.model)?
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build LLM model: {}", e))?;
    let limiter = rate_limiter(model_args.rpm);
    let ctx = AssistContext {
        model: model.as_ref(),
        rate_limiter: limiter.as_ref(),
    };

    let proposal = propose_selectors(&html, query, &ctx).await?;
    for (field, example) in proposal.fields.iter().zip(&proposal.examples) {
        println!(
            "{}\t[{}]\t{}\t{}",
            field.label,
            field.query().kind,
            field.selector,
            example.as_deref().unwrap_or_default()
        );
    }
    if !proposal.explanation.is_empty() {
        println!("\n{}", proposal.explanation);
    }

    if let Some(file) = save {
        let content = serde_json::to_string_pretty(&proposal.fields)?;
        fs::write(&file, content).with_context(|| format!("Failed to write {file}"))?;
        info!("Saved {} fields to {file}", proposal.fields.len());
    }

    if extract {
        let document = Document::parse(html);
        let extraction = extract_document(&document, &proposal.fields);
        for field_error in &extraction.field_errors {
            warn!("{}: {}", field_error.label, field_error.error.marker());
        }
        let content = export_extraction(&output.format, &extraction)?;
        emit(output.output.as_deref(), &content)?;
    }
    Ok(())
}

async fn handle_ask_command(
    source: &str,
    query: &str,
    model_args: &ModelArgs,
    output: &OutputArgs,
    fetch: &FetchArgs,
) -> Result<()> {
    let html = load_html(fetch, source).await?;
    let model = llm_builder(&model_args.model)?
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build LLM model: {}", e))?;
    let limiter = rate_limiter(model_args.rpm);
    let ctx = AssistContext {
        model: model.as_ref(),
        rate_limiter: limiter.as_ref(),
    };

    let extraction = extract_direct(&html, query, &ctx).await?;
    for field in extraction.fields.iter().filter(|field| !field.found) {
        warn!("Model did not find {}", field.label);
    }

    let content = export_rows(&output.format, &extraction.labels(), &[extraction.to_row()])?;
    emit(output.output.as_deref(), &content)
}

async fn handle_task_command(db: &str, command: TaskCommand) -> Result<()> {
    let storage = Storage::new(db)?;

    match command {
        TaskCommand::Add {
            name,
            url,
            wants,
            fields,
        } => {
            let source_url = Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid URL: {e}"))?;
            let pinned = fields.collect()?;

            if wants.is_empty() && pinned.is_empty() {
                bail!("Specify fields to extract with --want or --field");
            }
            let wants = if wants.is_empty() {
                pinned.iter().map(|field| field.label.clone()).collect()
            } else {
                wants
            };

            let selectors = (!pinned.is_empty()).then_some(pinned);
            let task = Task::new(name, source_url, wants, selectors);
            storage.add_task(&task)?;
            println!("{}", task.id);
            Ok(())
        }
        TaskCommand::List => {
            for task in storage.list_tasks()? {
                println!(
                    "{}\t{}\t{}\t{}\t{} fields{}",
                    task.id,
                    if task.enabled { "enabled" } else { "disabled" },
                    task.name,
                    task.source_url,
                    task.fields.len(),
                    if task.selectors.is_some() { ", pinned" } else { "" }
                );
            }
            Ok(())
        }
        TaskCommand::Remove { id } => {
            if !storage.remove_task(&id)? {
                bail!("Task {id} not found");
            }
            info!("Removed task {id}");
            Ok(())
        }
        TaskCommand::Enable { id } => set_enabled(&storage, &id, true),
        TaskCommand::Disable { id } => set_enabled(&storage, &id, false),
        TaskCommand::Run {
            id,
            model,
            rpm,
            fetch,
        } => {
            let fetcher = fetch.fetcher()?;
            let model = match model.as_deref() {
                Some(model) => Some(
                    llm_builder(model)?
                        .build()
                        .map_err(|e| anyhow::anyhow!("Failed to build LLM model: {}", e))?,
                ),
                None => None,
            };
            let limiter = rate_limiter(rpm);
            let ctx = model.as_ref().map(|model| AssistContext {
                model: model.as_ref(),
                rate_limiter: limiter.as_ref(),
            });

            let runs = match id {
                Some(id) => vec![run_stored_task(&storage, &id, &fetcher, ctx.as_ref()).await?],
                None => run_enabled_tasks(&storage, &fetcher, ctx.as_ref()).await?,
            };
            for run in runs {
                print_run(&run);
            }
            Ok(())
        }
        TaskCommand::History { id, limit } => {
            for run in storage.list_runs(id.as_deref(), limit)? {
                print_run(&run);
            }
            Ok(())
        }
    }
}

fn set_enabled(storage: &Storage, id: &str, enabled: bool) -> Result<()> {
    if !storage.set_task_enabled(id, enabled)? {
        bail!("Task {id} not found");
    }
    info!(
        "Task {id} {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn print_run(run: &htmlsift::storage::TaskRun) {
    println!(
        "{}\t{}\t{}\t{} rows\t{}",
        run.ran_at.format("%Y-%m-%d %H:%M"),
        run.task_id,
        if run.success { "ok" } else { "failed" },
        run.total,
        run.error.as_deref().unwrap_or_default()
    );
}

fn llm_builder(model: &str) -> Result<LLMBuilder> {
    let model_url = Url::parse(model).map_err(|e| anyhow::anyhow!("Invalid model URL: {}", e))?;
    let llm_builder = LLMBuilder::new()
        .backend(
            LLMBackend::from_str(model_url.scheme())
                .map_err(|e| anyhow::anyhow!("Invalid LLM backend: {}", e))?,
        )
        .model(
            [
                model_url
                    .host_str()
                    .context("Specify model name as host URL.")?,
                model_url.username(),
            ]
            .iter()
            .filter(|x| !x.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(":"),
        );

    let llm_builder = match api_key(model_url.scheme()) {
        Some((name, key)) => {
            info!("API key is provided by {name}: {}", mask_api_key(&key));
            llm_builder.api_key(key)
        }
        None => {
            info!("No API key found in {MODEL_API_KEY_ENV_NAME}");
            llm_builder
        }
    };

    Ok(llm_builder)
}

fn api_key(backend: &str) -> Option<(&'static str, String)> {
    std::iter::once(MODEL_API_KEY_ENV_NAME)
        .chain(
            PROVIDER_API_KEY_ENV_NAMES
                .iter()
                .filter(|(provider, _)| backend.eq_ignore_ascii_case(provider))
                .map(|(_, name)| *name),
        )
        .find_map(|name| {
            std::env::var(name)
                .ok()
                .filter(|key| !key.is_empty())
                .map(|key| (name, key))
        })
}

async fn load_html(fetch: &FetchArgs, source: &str) -> Result<String> {
    let fetcher = fetch.fetcher()?;
    fetcher
        .load(source)
        .await
        .html
        .map_err(|message| anyhow::anyhow!("Unable to load {source}: {message}"))
}

fn read_fields_file(file: &str) -> Result<Vec<FieldDescriptor>> {
    let content =
        fs::read_to_string(file).with_context(|| format!("Failed to read fields file: {file}"))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid fields file: {file}"))
}

fn read_lines(file: &str) -> Result<Vec<String>> {
    let content = fs::read_to_string(file).with_context(|| format!("Failed to read {file}"))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

fn emit(output: Option<&str>, content: &str) -> Result<()> {
    match output {
        Some(file) => {
            fs::write(file, content).with_context(|| format!("Failed to write {file}"))?;
            info!("Wrote {file}");
        }
        None => println!("{content}"),
    }
    Ok(())
}
