use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    config::Settings,
    gateway::{HttpGateway, ResearchApi},
    orchestrator::TaskOrchestrator,
    poller::TaskStatusPoller,
    store::StoreEvent,
    stores::{AnalysisStore, AuthStore, ProtocolStore, VisualizationStore},
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Every store of one dashboard session, built once at startup and torn
/// down with [`AppState::shutdown`].
pub struct AppState {
    pub settings: Settings,
    pub api: Arc<dyn ResearchApi>,
    pub protocols: ProtocolStore,
    pub analysis: Arc<AnalysisStore>,
    pub visualizations: VisualizationStore,
    pub auth: AuthStore,
    pub poller: TaskStatusPoller,
    events: broadcast::Sender<StoreEvent>,
}

impl AppState {
    pub async fn init(settings: Settings) -> anyhow::Result<Arc<Self>> {
        let gateway = HttpGateway::with_timeout(&settings.api_base_url, settings.request_timeout())
            .with_context(|| format!("invalid api base url '{}'", settings.api_base_url))?;
        let api: Arc<dyn ResearchApi> = Arc::new(gateway);
        if let Some(token) = settings.auth_token.clone() {
            api.set_auth_token(Some(token)).await;
        }
        info!(api_base_url = %settings.api_base_url, "app: state initialised");
        Ok(Self::with_api(settings, api))
    }

    pub fn with_api(settings: Settings, api: Arc<dyn ResearchApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            protocols: ProtocolStore::new(Arc::clone(&api), events.clone()),
            analysis: Arc::new(AnalysisStore::new(Arc::clone(&api), events.clone())),
            visualizations: VisualizationStore::new(Arc::clone(&api), events.clone()),
            auth: AuthStore::new(Arc::clone(&api), events.clone()),
            poller: TaskStatusPoller::new(settings.poll_schedule()),
            settings,
            api,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn orchestrator(self: &Arc<Self>) -> TaskOrchestrator {
        TaskOrchestrator::new(Arc::clone(self))
    }

    /// Stops background work. In-flight store requests owned by callers are
    /// left to settle.
    pub async fn shutdown(&self) {
        self.poller.stop().await;
        info!("app: state shut down");
    }
}
