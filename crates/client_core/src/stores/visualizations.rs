use std::sync::Arc;

use shared::{
    domain::{Visualization, VisualizationId},
    protocol::VisualizationUpdate,
};
use tokio::sync::broadcast;

use crate::{
    flight::OperationKind,
    gateway::ResearchApi,
    store::{ResourceStore, Settlement, StoreEvent},
    upload::VisualizationDraft,
};

pub struct VisualizationStore {
    api: Arc<dyn ResearchApi>,
    visualizations: ResourceStore<Visualization>,
}

impl VisualizationStore {
    pub fn new(api: Arc<dyn ResearchApi>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            api,
            visualizations: ResourceStore::new(events),
        }
    }

    pub fn state(&self) -> &ResourceStore<Visualization> {
        &self.visualizations
    }

    pub async fn fetch(&self) -> Settlement<Vec<Visualization>> {
        self.visualizations
            .fetch(self.api.list_visualizations())
            .await
    }

    /// All files of the draft travel in one multipart request.
    pub async fn create(&self, draft: &VisualizationDraft) -> Settlement<Visualization> {
        self.visualizations
            .create(OperationKind::Create, self.api.create_visualization(draft))
            .await
    }

    pub async fn update(
        &self,
        id: VisualizationId,
        update: &VisualizationUpdate,
    ) -> Settlement<Visualization> {
        self.visualizations
            .update(id, self.api.update_visualization(id, update))
            .await
    }

    pub async fn delete(&self, id: VisualizationId) -> Settlement<VisualizationId> {
        self.visualizations
            .delete(id, self.api.delete_visualization(id))
            .await
    }

    pub async fn clear_error(&self) {
        self.visualizations.clear_error().await;
    }
}
