//! Workflows that span more than one store. Preconditions are checked here,
//! before any request is issued; each store still records its own errors.

use std::sync::Arc;

use chrono::Local;
use shared::{
    domain::{
        AnalysisTask, DataFile, DataFileId, Protocol, TaskId, TaskType, Visualization,
        VisualizationId,
    },
    protocol::{ActionAck, AnalysisTaskRequest, ProtocolDraft},
};
use tracing::{debug, info, warn};

use crate::{
    app_state::AppState,
    error::PreconditionError,
    store::Settlement,
    upload::{
        DataFileUpload, FileAttachment, UploadFailure, UploadPolicy, UploadReport,
        VisualizationDraft,
    },
};

/// Inputs of the analysis form. Every field must be filled before a task
/// request is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSelection {
    pub data_file: Option<DataFileId>,
    pub task_type: Option<TaskType>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRefresh {
    pub protocols: Settlement<Vec<Protocol>>,
    pub tasks: Settlement<Vec<AnalysisTask>>,
    pub visualizations: Settlement<Vec<Visualization>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRefresh {
    pub data_files: Settlement<Vec<DataFile>>,
    pub tasks: Settlement<Vec<AnalysisTask>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadAndAnalyze {
    pub report: UploadReport,
    /// `None` when no file of the batch was uploaded.
    pub task: Option<Settlement<AnalysisTask>>,
}

#[derive(Clone)]
pub struct TaskOrchestrator {
    app: Arc<AppState>,
}

impl TaskOrchestrator {
    pub fn new(app: Arc<AppState>) -> Self {
        Self { app }
    }

    /// Protocols, analysis tasks and visualizations, fetched concurrently.
    pub async fn refresh_dashboard(&self) -> DashboardRefresh {
        let (protocols, tasks, visualizations) = futures::join!(
            self.app.protocols.fetch(),
            self.app.analysis.fetch_tasks(),
            self.app.visualizations.fetch(),
        );
        debug!(
            protocols = protocols.is_applied(),
            tasks = tasks.is_applied(),
            visualizations = visualizations.is_applied(),
            "orchestrator: dashboard refreshed"
        );
        DashboardRefresh {
            protocols,
            tasks,
            visualizations,
        }
    }

    pub async fn refresh_analysis(&self) -> AnalysisRefresh {
        let (data_files, tasks) = futures::join!(
            self.app.analysis.fetch_data_files(),
            self.app.analysis.fetch_tasks(),
        );
        AnalysisRefresh { data_files, tasks }
    }

    /// Uploads with the configured [`UploadPolicy`].
    pub async fn upload_files(
        &self,
        files: Vec<FileAttachment>,
    ) -> Result<UploadReport, PreconditionError> {
        self.upload_files_with(files, self.app.settings.upload_policy)
            .await
    }

    /// One request per file, in selection order, each awaited before the
    /// next is sent.
    pub async fn upload_files_with(
        &self,
        files: Vec<FileAttachment>,
        policy: UploadPolicy,
    ) -> Result<UploadReport, PreconditionError> {
        if files.is_empty() {
            return Err(PreconditionError::NoFiles);
        }

        info!(count = files.len(), %policy, "upload: batch started");
        let mut report = UploadReport::default();
        let mut queue = files.into_iter();
        while let Some(file) = queue.next() {
            let upload = DataFileUpload::from_selection(file, Local::now());
            match self.app.analysis.upload_data_file(&upload).await {
                Settlement::Applied(data_file) => {
                    info!(
                        file = %upload.name,
                        id = %data_file.id,
                        kind = %upload.file_type,
                        "upload: file stored"
                    );
                    report.uploaded.push(data_file);
                }
                Settlement::Failed(message) => {
                    warn!(file = %upload.name, error = %message, "upload: file failed");
                    report.failed.push(UploadFailure {
                        file_name: upload.name,
                        message,
                    });
                    if policy == UploadPolicy::AbortOnFailure {
                        report.skipped = queue.by_ref().map(|file| file.file_name).collect();
                        warn!(skipped = report.skipped.len(), "upload: batch aborted");
                        break;
                    }
                }
                Settlement::Superseded => {
                    debug!(file = %upload.name, "upload: overtaken by a newer upload");
                    report.superseded.push(upload.name);
                }
            }
        }

        info!(
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "upload: batch finished"
        );
        Ok(report)
    }

    pub async fn create_analysis_task(
        &self,
        selection: &AnalysisSelection,
    ) -> Result<Settlement<AnalysisTask>, PreconditionError> {
        let data_file = selection
            .data_file
            .ok_or(PreconditionError::MissingDataFile)?;
        let task_type = require_task_type(selection.task_type)?;
        let name = require_text(&selection.name, "name")?;

        Ok(self.submit_task(name, task_type, vec![data_file]).await)
    }

    /// Uploads the batch, then runs one analysis over every file that made
    /// it to the server.
    pub async fn upload_and_analyze(
        &self,
        files: Vec<FileAttachment>,
        task_type: Option<TaskType>,
        name: &str,
    ) -> Result<UploadAndAnalyze, PreconditionError> {
        let task_type = require_task_type(task_type)?;
        let name = require_text(name, "name")?;

        let report = self.upload_files(files).await?;
        let data_files = report.uploaded_ids();
        if data_files.is_empty() {
            warn!("orchestrator: nothing uploaded, analysis not requested");
            return Ok(UploadAndAnalyze { report, task: None });
        }

        let task = self.submit_task(name, task_type, data_files).await;
        Ok(UploadAndAnalyze {
            report,
            task: Some(task),
        })
    }

    pub async fn start_analysis_task(&self, id: TaskId) -> Settlement<ActionAck> {
        let settlement = self.app.analysis.start_task(id).await;
        if settlement.is_applied() {
            info!(task = %id, "orchestrator: analysis task started");
            self.app
                .poller
                .ensure_running(Arc::clone(&self.app.analysis))
                .await;
        }
        settlement
    }

    /// Starts the status poller if any known task is still pending or
    /// processing. Returns whether a new poll loop was spawned.
    pub async fn watch_task_status(&self) -> bool {
        if !self.app.analysis.has_pending_tasks().await {
            debug!("orchestrator: no pending analysis tasks to watch");
            return false;
        }
        self.app
            .poller
            .ensure_running(Arc::clone(&self.app.analysis))
            .await
    }

    /// Stages a generated protocol as the current protocol without saving it.
    pub async fn generate_protocol(
        &self,
        prompt: &str,
    ) -> Result<Settlement<Protocol>, PreconditionError> {
        let prompt = require_text(prompt, "prompt")?;
        info!(prompt_len = prompt.len(), "orchestrator: generating protocol");
        Ok(self.app.protocols.generate(prompt).await)
    }

    /// Persists the staged protocol, optionally retitled or redescribed.
    pub async fn save_staged_protocol(
        &self,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Settlement<Protocol>, PreconditionError> {
        let staged = self
            .app
            .protocols
            .state()
            .current()
            .await
            .ok_or(PreconditionError::NothingStaged)?;

        let mut draft = ProtocolDraft::from(&staged);
        if let Some(title) = title {
            draft.title = title.trim().to_string();
        }
        if let Some(description) = description {
            draft.description = description.to_string();
        }
        require_text(&draft.title, "title")?;

        info!(
            title = %draft.title,
            steps = draft.steps.len(),
            "orchestrator: saving staged protocol"
        );
        Ok(self.app.protocols.create(&draft).await)
    }

    /// Sends the title and every file in a single multipart request.
    pub async fn create_visualization(
        &self,
        draft: &VisualizationDraft,
    ) -> Result<Settlement<Visualization>, PreconditionError> {
        require_text(&draft.title, "title")?;
        if draft.data_files.is_empty() {
            return Err(PreconditionError::NoFiles);
        }
        info!(
            title = %draft.title,
            chart_type = %draft.chart_type,
            files = draft.data_files.len(),
            "orchestrator: creating visualization"
        );
        Ok(self.app.visualizations.create(draft).await)
    }

    pub async fn delete_visualization(&self, id: VisualizationId) -> Settlement<VisualizationId> {
        self.app.visualizations.delete(id).await
    }

    async fn submit_task(
        &self,
        name: &str,
        task_type: TaskType,
        data_files: Vec<DataFileId>,
    ) -> Settlement<AnalysisTask> {
        let request = AnalysisTaskRequest {
            name: name.to_string(),
            task_type,
            data_files,
            parameters: serde_json::Map::new(),
        };
        let settlement = self.app.analysis.create_task(&request).await;
        if let Settlement::Applied(task) = &settlement {
            info!(task = %task.id, status = %task.status, "orchestrator: analysis task created");
            if !task.status.is_terminal() {
                self.app
                    .poller
                    .ensure_running(Arc::clone(&self.app.analysis))
                    .await;
            }
        }
        settlement
    }
}

fn require_task_type(task_type: Option<TaskType>) -> Result<TaskType, PreconditionError> {
    let task_type = task_type.ok_or(PreconditionError::MissingTaskType)?;
    if !task_type.is_selectable() {
        return Err(PreconditionError::UnsupportedTaskType(
            task_type.as_str().to_string(),
        ));
    }
    Ok(task_type)
}

fn require_text<'a>(value: &'a str, field: &'static str) -> Result<&'a str, PreconditionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PreconditionError::EmptyField(field));
    }
    Ok(trimmed)
}
