use std::sync::Arc;

use shared::{
    domain::{Protocol, ProtocolId},
    protocol::{GenerateProtocolRequest, ProtocolDraft, SavedProtocol},
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    flight::OperationKind,
    gateway::ResearchApi,
    store::{ResourceStore, Settlement, StoreEvent},
};

pub struct ProtocolStore {
    api: Arc<dyn ResearchApi>,
    protocols: ResourceStore<Protocol>,
}

impl ProtocolStore {
    pub fn new(api: Arc<dyn ResearchApi>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            api,
            protocols: ResourceStore::new(events),
        }
    }

    /// Collection, current protocol, flight flags and error.
    pub fn state(&self) -> &ResourceStore<Protocol> {
        &self.protocols
    }

    pub async fn fetch(&self) -> Settlement<Vec<Protocol>> {
        self.protocols.fetch(self.api.list_protocols()).await
    }

    /// Stages the generated protocol as current; the collection is untouched
    /// until it is saved.
    pub async fn generate(&self, prompt: &str) -> Settlement<Protocol> {
        let request = GenerateProtocolRequest::new(prompt);
        self.protocols
            .stage(OperationKind::Generate, self.api.generate_protocol(&request))
            .await
    }

    /// Saves a new protocol, prepends it and makes it current. When the server
    /// does not echo an id, the collection is refetched and the newest protocol
    /// with the draft's title becomes current.
    pub async fn create(&self, draft: &ProtocolDraft) -> Settlement<Protocol> {
        let request = async {
            self.api
                .create_protocol(draft)
                .await
                .map(SavedProtocol::identified)
        };
        match self
            .protocols
            .create_or_acknowledge(OperationKind::Create, request)
            .await
        {
            Settlement::Applied(Some(protocol)) => Settlement::Applied(protocol),
            Settlement::Applied(None) => self.locate_saved(&draft.title).await,
            Settlement::Failed(message) => Settlement::Failed(message),
            Settlement::Superseded => Settlement::Superseded,
        }
    }

    async fn locate_saved(&self, title: &str) -> Settlement<Protocol> {
        debug!(title, "protocols: create response carried no id, refetching");
        let protocols = match self.fetch().await {
            Settlement::Applied(protocols) => protocols,
            Settlement::Failed(message) => return Settlement::Failed(message),
            Settlement::Superseded => return Settlement::Superseded,
        };
        match protocols.into_iter().find(|protocol| protocol.title == title) {
            Some(protocol) => {
                self.protocols.set_current(Some(protocol.clone())).await;
                Settlement::Applied(protocol)
            }
            None => {
                warn!(title, "protocols: saved protocol missing from refetched list");
                Settlement::Superseded
            }
        }
    }

    pub async fn update(&self, id: ProtocolId, draft: &ProtocolDraft) -> Settlement<Protocol> {
        self.protocols
            .update(id, self.api.update_protocol(id, draft))
            .await
    }

    pub async fn delete(&self, id: ProtocolId) -> Settlement<ProtocolId> {
        self.protocols
            .delete(id, self.api.delete_protocol(id))
            .await
    }

    pub async fn clear_error(&self) {
        self.protocols.clear_error().await;
    }
}
