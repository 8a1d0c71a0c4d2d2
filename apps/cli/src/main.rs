use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, upload::VisualizationDraft, AnalysisSelection, AppState, FileAttachment,
    Settlement, UploadPolicy, UploadReport, UploadTarget,
};
use shared::{
    domain::{ChartType, DataFileId, ProtocolId, TaskId, TaskType, VisualizationId},
    protocol::Credentials,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard", about = "Research dashboard client")]
struct Cli {
    /// Overrides `api_base_url` from dashboard.toml and the environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch protocols, analysis tasks and visualizations.
    Dashboard,
    Protocols {
        #[command(subcommand)]
        action: ProtocolCommand,
    },
    Files {
        #[command(subcommand)]
        action: FileCommand,
    },
    Tasks {
        #[command(subcommand)]
        action: TaskCommand,
    },
    Viz {
        #[command(subcommand)]
        action: VizCommand,
    },
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Whoami,
}

#[derive(Subcommand, Debug)]
enum ProtocolCommand {
    List,
    Generate {
        prompt: String,
        /// Persist the generated protocol right away.
        #[arg(long)]
        save: bool,
        #[arg(long)]
        title: Option<String>,
    },
    Delete {
        id: ProtocolId,
    },
}

#[derive(Subcommand, Debug)]
enum FileCommand {
    List,
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        abort_on_failure: bool,
        /// Run this analysis over every uploaded file.
        #[arg(long)]
        analyze: Option<TaskType>,
        #[arg(long, requires = "analyze")]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    List,
    Create {
        #[arg(long)]
        file: DataFileId,
        #[arg(long = "type")]
        task_type: TaskType,
        #[arg(long)]
        name: String,
        #[arg(long)]
        watch: bool,
    },
    Start {
        id: TaskId,
        #[arg(long)]
        watch: bool,
    },
    /// Poll until every task is completed, failed or cancelled.
    Watch,
}

#[derive(Subcommand, Debug)]
enum VizCommand {
    List,
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "bar")]
        chart_type: ChartType,
        #[arg(long, default_value = "")]
        x_label: String,
        #[arg(long, default_value = "")]
        y_label: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Delete {
        id: VisualizationId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url.as_deref() {
        settings.set_api_base_url(api_url);
    }
    if let Some(token) = cli.token {
        settings.auth_token = Some(token);
    }
    if matches!(
        cli.command,
        Command::Files {
            action: FileCommand::Upload {
                abort_on_failure: true,
                ..
            }
        }
    ) {
        settings.upload_policy = UploadPolicy::AbortOnFailure;
    }

    let app = AppState::init(settings).await?;
    let outcome = run(&app, cli.command).await;
    app.shutdown().await;
    outcome
}

async fn run(app: &Arc<AppState>, command: Command) -> Result<()> {
    let orchestrator = app.orchestrator();

    match command {
        Command::Dashboard => {
            let refresh = orchestrator.refresh_dashboard().await;
            if let Some(protocols) = settled(refresh.protocols, "protocols")? {
                println!("protocols: {}", protocols.len());
            }
            if let Some(tasks) = settled(refresh.tasks, "analysis tasks")? {
                println!("analysis tasks: {}", tasks.len());
                for task in tasks.iter().take(5) {
                    println!("  {}  {:<12} {}", task.id, task.status, task.name);
                }
            }
            if let Some(visualizations) = settled(refresh.visualizations, "visualizations")? {
                println!("visualizations: {}", visualizations.len());
            }
        }
        Command::Protocols { action } => match action {
            ProtocolCommand::List => {
                for protocol in settled(app.protocols.fetch().await, "protocols")?
                    .unwrap_or_default()
                {
                    println!(
                        "{}  {} ({} steps)",
                        protocol.id,
                        protocol.title,
                        protocol.steps.len()
                    );
                }
            }
            ProtocolCommand::Generate {
                prompt,
                save,
                title,
            } => {
                let generated = orchestrator.generate_protocol(&prompt).await?;
                let Some(protocol) = settled(generated, "generate protocol")? else {
                    return Ok(());
                };
                println!("{}", protocol.title);
                for step in &protocol.steps {
                    println!("  {}. [{}] {}", step.step_number, step.step_type, step.title);
                }
                if save {
                    let saved = orchestrator
                        .save_staged_protocol(title.as_deref(), None)
                        .await?;
                    if let Some(saved) = settled(saved, "save protocol")? {
                        println!("saved as {}", saved.id);
                    }
                }
            }
            ProtocolCommand::Delete { id } => {
                settled(app.protocols.delete(id).await, "delete protocol")?;
                println!("deleted protocol {id}");
            }
        },
        Command::Files { action } => match action {
            FileCommand::List => {
                for file in settled(app.analysis.fetch_data_files().await, "data files")?
                    .unwrap_or_default()
                {
                    println!("{}  {:<13} {}", file.id, file.file_type, file.name);
                }
            }
            FileCommand::Upload {
                paths,
                analyze,
                name,
                ..
            } => {
                let files = read_selection(&paths, UploadTarget::Analysis).await?;
                match analyze {
                    Some(task_type) => {
                        let name = name.unwrap_or_else(|| format!("{task_type} analysis"));
                        let outcome = orchestrator
                            .upload_and_analyze(files, Some(task_type), &name)
                            .await?;
                        print_report(&outcome.report);
                        if let Some(task) = outcome.task {
                            if let Some(task) = settled(task, "create analysis task")? {
                                println!("analysis task {} is {}", task.id, task.status);
                            }
                        }
                    }
                    None => {
                        let report = orchestrator.upload_files(files).await?;
                        print_report(&report);
                    }
                }
            }
        },
        Command::Tasks { action } => match action {
            TaskCommand::List => {
                for task in settled(app.analysis.fetch_tasks().await, "analysis tasks")?
                    .unwrap_or_default()
                {
                    println!(
                        "{}  {:<12} {:<24} {}",
                        task.id, task.status, task.task_type, task.name
                    );
                }
            }
            TaskCommand::Create {
                file,
                task_type,
                name,
                watch,
            } => {
                let selection = AnalysisSelection {
                    data_file: Some(file),
                    task_type: Some(task_type),
                    name,
                };
                let created = orchestrator.create_analysis_task(&selection).await?;
                if let Some(task) = settled(created, "create analysis task")? {
                    println!("created analysis task {} ({})", task.id, task.status);
                }
                if watch {
                    wait_for_tasks(app).await;
                }
            }
            TaskCommand::Start { id, watch } => {
                if let Some(ack) = settled(orchestrator.start_analysis_task(id).await, "start")? {
                    println!("{}", ack.message);
                }
                if watch {
                    wait_for_tasks(app).await;
                }
            }
            TaskCommand::Watch => {
                settled(app.analysis.fetch_tasks().await, "analysis tasks")?;
                if orchestrator.watch_task_status().await {
                    wait_for_tasks(app).await;
                } else {
                    println!("no pending analysis tasks");
                }
            }
        },
        Command::Viz { action } => match action {
            VizCommand::List => {
                for viz in settled(app.visualizations.fetch().await, "visualizations")?
                    .unwrap_or_default()
                {
                    println!("{}  {:<8} {}", viz.id, viz.chart_type, viz.title);
                }
            }
            VizCommand::Create {
                title,
                chart_type,
                x_label,
                y_label,
                paths,
            } => {
                if !ChartType::SELECTABLE.contains(&chart_type) {
                    bail!("chart type '{chart_type}' cannot be created from the dashboard");
                }
                let draft = VisualizationDraft {
                    title,
                    chart_type,
                    x_axis_label: x_label,
                    y_axis_label: y_label,
                    data_files: read_selection(&paths, UploadTarget::Visualization).await?,
                };
                let created = orchestrator.create_visualization(&draft).await?;
                if let Some(viz) = settled(created, "create visualization")? {
                    println!("created visualization {}", viz.id);
                }
            }
            VizCommand::Delete { id } => {
                settled(orchestrator.delete_visualization(id).await, "delete visualization")?;
                println!("deleted visualization {id}");
            }
        },
        Command::Login { username, password } => {
            let credentials = Credentials { username, password };
            if let Some(user) = settled(app.auth.login(&credentials).await, "login")? {
                println!("signed in as {}", user.username);
                println!("set DASHBOARD_TOKEN to reuse this session");
            }
        }
        Command::Whoami => {
            if let Some(user) = settled(app.auth.refresh_profile().await, "profile")? {
                println!("{} <{}>", user.username, user.email);
            }
        }
    }

    Ok(())
}

/// Reads the selected files, dropping any the target does not accept.
async fn read_selection(paths: &[PathBuf], target: UploadTarget) -> Result<Vec<FileAttachment>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = file_name(path)?;
        if !target.accepts(&file_name) {
            warn!(file = %path.display(), ?target, "cli: file type not accepted, skipping");
            continue;
        }
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        files.push(FileAttachment::new(file_name, content));
    }
    Ok(files)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("'{}' has no usable file name", path.display()))
}

fn settled<T>(settlement: Settlement<T>, what: &str) -> Result<Option<T>> {
    match settlement {
        Settlement::Applied(value) => Ok(Some(value)),
        Settlement::Failed(message) => bail!("{what}: {message}"),
        Settlement::Superseded => {
            warn!(operation = what, "cli: result superseded by a newer request");
            Ok(None)
        }
    }
}

fn print_report(report: &UploadReport) {
    for file in &report.uploaded {
        println!("uploaded {}  {:<13} {}", file.id, file.file_type, file.name);
    }
    for failure in &report.failed {
        println!("failed   {}: {}", failure.file_name, failure.message);
    }
    for name in &report.superseded {
        println!("uploaded {name} (refresh to see it)");
    }
    for name in &report.skipped {
        println!("skipped  {name}");
    }
}

async fn wait_for_tasks(app: &AppState) {
    app.poller.join().await;
    for task in app.analysis.tasks().items().await {
        println!("{}  {:<12} {}", task.id, task.status, task.name);
    }
}
