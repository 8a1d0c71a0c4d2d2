use std::sync::Arc;

use shared::{
    domain::{AnalysisTask, DataFile, TaskId},
    protocol::{ActionAck, AnalysisTaskRequest},
};
use tokio::sync::broadcast;

use crate::{
    flight::OperationKind,
    gateway::ResearchApi,
    store::{ResourceStore, Settlement, StoreEvent},
    upload::DataFileUpload,
};

/// Data files and the analysis tasks run over them. The two collections
/// keep separate flight flags and errors.
pub struct AnalysisStore {
    api: Arc<dyn ResearchApi>,
    data_files: ResourceStore<DataFile>,
    tasks: ResourceStore<AnalysisTask>,
}

impl AnalysisStore {
    pub fn new(api: Arc<dyn ResearchApi>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            api,
            data_files: ResourceStore::new(events.clone()),
            tasks: ResourceStore::new(events),
        }
    }

    pub fn data_files(&self) -> &ResourceStore<DataFile> {
        &self.data_files
    }

    pub fn tasks(&self) -> &ResourceStore<AnalysisTask> {
        &self.tasks
    }

    pub async fn fetch_data_files(&self) -> Settlement<Vec<DataFile>> {
        self.data_files.fetch(self.api.list_data_files()).await
    }

    /// Uploads one file; a success is prepended. The current data file stays.
    pub async fn upload_data_file(&self, upload: &DataFileUpload) -> Settlement<DataFile> {
        self.data_files
            .insert(OperationKind::Upload, self.api.upload_data_file(upload))
            .await
    }

    pub async fn fetch_tasks(&self) -> Settlement<Vec<AnalysisTask>> {
        self.tasks.fetch(self.api.list_analysis_tasks()).await
    }

    pub async fn create_task(&self, request: &AnalysisTaskRequest) -> Settlement<AnalysisTask> {
        self.tasks
            .create(OperationKind::Create, self.api.create_analysis_task(request))
            .await
    }

    /// Asks the server to run a task. Its status change is only seen on the
    /// next fetch.
    pub async fn start_task(&self, id: TaskId) -> Settlement<ActionAck> {
        self.tasks
            .acknowledge(OperationKind::Start, self.api.start_analysis_task(id))
            .await
    }

    pub async fn has_pending_tasks(&self) -> bool {
        self.tasks
            .items()
            .await
            .iter()
            .any(|task| !task.status.is_terminal())
    }

    pub async fn clear_error(&self) {
        self.data_files.clear_error().await;
        self.tasks.clear_error().await;
    }

    /// The task collection's error, else the data-file collection's.
    pub async fn error(&self) -> Option<String> {
        match self.tasks.error().await {
            Some(error) => Some(error),
            None => self.data_files.error().await,
        }
    }
}
