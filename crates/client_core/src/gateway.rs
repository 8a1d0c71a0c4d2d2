//! Typed request/response wrapper around the research API. Holds no
//! resource state; only the session token is remembered between calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Method, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        AnalysisTask, DataFile, Protocol, ProtocolId, TaskId, UserProfile, Visualization,
        VisualizationId,
    },
    error::describe_error_body,
    protocol::{
        ActionAck, AnalysisTaskRequest, AuthSession, Credentials, GenerateProtocolRequest,
        Listing, ProtocolDraft, Registration, SavedProtocol, VisualizationUpdate,
    },
};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::{
    error::{ApiResult, GatewayError},
    upload::{DataFileUpload, FileAttachment, VisualizationDraft},
};

#[async_trait]
pub trait ResearchApi: Send + Sync {
    async fn list_protocols(&self) -> ApiResult<Listing<Protocol>>;
    async fn generate_protocol(&self, request: &GenerateProtocolRequest) -> ApiResult<Protocol>;
    /// The create endpoint may answer without an `id`.
    async fn create_protocol(&self, draft: &ProtocolDraft) -> ApiResult<SavedProtocol>;
    async fn update_protocol(&self, id: ProtocolId, draft: &ProtocolDraft) -> ApiResult<Protocol>;
    async fn delete_protocol(&self, id: ProtocolId) -> ApiResult<()>;

    async fn list_data_files(&self) -> ApiResult<Listing<DataFile>>;
    async fn upload_data_file(&self, upload: &DataFileUpload) -> ApiResult<DataFile>;

    async fn list_analysis_tasks(&self) -> ApiResult<Listing<AnalysisTask>>;
    async fn create_analysis_task(&self, request: &AnalysisTaskRequest)
        -> ApiResult<AnalysisTask>;
    async fn start_analysis_task(&self, id: TaskId) -> ApiResult<ActionAck>;

    async fn list_visualizations(&self) -> ApiResult<Listing<Visualization>>;
    async fn create_visualization(&self, draft: &VisualizationDraft) -> ApiResult<Visualization>;
    async fn update_visualization(
        &self,
        id: VisualizationId,
        update: &VisualizationUpdate,
    ) -> ApiResult<Visualization>;
    async fn delete_visualization(&self, id: VisualizationId) -> ApiResult<()>;

    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthSession>;
    async fn register(&self, registration: &Registration) -> ApiResult<AuthSession>;
    async fn logout(&self) -> ApiResult<ActionAck>;
    async fn current_user(&self) -> ApiResult<UserProfile>;

    async fn set_auth_token(&self, token: Option<String>);
}

pub struct HttpGateway {
    http: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> ApiResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self::with_client(builder.build()?, base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> ApiResult<Self> {
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(Self {
            http,
            base_url,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let url = self.base_url.join(path)?;
        debug!(method = %method, url = %url, "gateway: request");
        let mut builder = self.http.request(method, url);
        if let Some(token) = self.token.read().await.as_deref() {
            builder = builder.header("Authorization", format!("Token {token}"));
        }
        Ok(builder)
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> ApiResult<R> {
        let response = self.request(Method::GET, path).await?.send().await?;
        decode(response).await
    }

    async fn send_json<B, R>(&self, method: Method, path: &str, body: &B) -> ApiResult<R>
    where
        B: serde::Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .request(method, path)
            .await?
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn send_form<R: DeserializeOwned>(&self, path: &str, form: Form) -> ApiResult<R> {
        let response = self
            .request(Method::POST, path)
            .await?
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        let response = self.request(Method::DELETE, path).await?.send().await?;
        expect_success(response).await.map(|_| ())
    }
}

fn file_part(file: &FileAttachment) -> ApiResult<Part> {
    Ok(Part::bytes(file.content.clone())
        .file_name(file.file_name.clone())
        .mime_str(file.mime_or_default())?)
}

async fn expect_success(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status = status.as_u16();
    let body = response.bytes().await.unwrap_or_default();
    let message = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .as_ref()
        .and_then(describe_error_body);
    Err(match message {
        Some(message) => GatewayError::Rejected { status, message },
        None => GatewayError::Status { status },
    })
}

async fn decode<R: DeserializeOwned>(response: Response) -> ApiResult<R> {
    Ok(expect_success(response).await?.json().await?)
}

#[async_trait]
impl ResearchApi for HttpGateway {
    async fn list_protocols(&self) -> ApiResult<Listing<Protocol>> {
        self.get("protocols/").await
    }

    async fn generate_protocol(&self, request: &GenerateProtocolRequest) -> ApiResult<Protocol> {
        self.send_json(Method::POST, "protocols/generate/", request)
            .await
    }

    async fn create_protocol(&self, draft: &ProtocolDraft) -> ApiResult<SavedProtocol> {
        self.send_json(Method::POST, "protocols/", draft).await
    }

    async fn update_protocol(&self, id: ProtocolId, draft: &ProtocolDraft) -> ApiResult<Protocol> {
        let saved: SavedProtocol = self
            .send_json(Method::PUT, &format!("protocols/{id}/"), draft)
            .await?;
        Ok(saved.into_protocol(id))
    }

    async fn delete_protocol(&self, id: ProtocolId) -> ApiResult<()> {
        self.delete(&format!("protocols/{id}/")).await
    }

    async fn list_data_files(&self) -> ApiResult<Listing<DataFile>> {
        self.get("analysis/files/").await
    }

    async fn upload_data_file(&self, upload: &DataFileUpload) -> ApiResult<DataFile> {
        let form = Form::new()
            .part("file", file_part(&upload.file)?)
            .text("name", upload.name.clone())
            .text("file_type", upload.file_type.as_str())
            .text("description", upload.description.clone());
        self.send_form("analysis/files/", form).await
    }

    async fn list_analysis_tasks(&self) -> ApiResult<Listing<AnalysisTask>> {
        self.get("analysis/tasks/").await
    }

    async fn create_analysis_task(
        &self,
        request: &AnalysisTaskRequest,
    ) -> ApiResult<AnalysisTask> {
        self.send_json(Method::POST, "analysis/tasks/", request)
            .await
    }

    async fn start_analysis_task(&self, id: TaskId) -> ApiResult<ActionAck> {
        let response = self
            .request(Method::POST, &format!("analysis/tasks/{id}/start/"))
            .await?
            .send()
            .await?;
        decode(response).await
    }

    async fn list_visualizations(&self) -> ApiResult<Listing<Visualization>> {
        self.get("visualization/").await
    }

    async fn create_visualization(&self, draft: &VisualizationDraft) -> ApiResult<Visualization> {
        let mut form = Form::new()
            .text("title", draft.title.clone())
            .text("chart_type", draft.chart_type.as_str())
            .text("x_axis_label", draft.x_axis_label.clone())
            .text("y_axis_label", draft.y_axis_label.clone());
        for file in &draft.data_files {
            form = form.part("data_files", file_part(file)?);
        }
        self.send_form("visualization/", form).await
    }

    async fn update_visualization(
        &self,
        id: VisualizationId,
        update: &VisualizationUpdate,
    ) -> ApiResult<Visualization> {
        self.send_json(Method::PUT, &format!("visualization/{id}/"), update)
            .await
    }

    async fn delete_visualization(&self, id: VisualizationId) -> ApiResult<()> {
        self.delete(&format!("visualization/{id}/")).await
    }

    async fn login(&self, credentials: &Credentials) -> ApiResult<AuthSession> {
        self.send_json(Method::POST, "users/login/", credentials)
            .await
    }

    async fn register(&self, registration: &Registration) -> ApiResult<AuthSession> {
        self.send_json(Method::POST, "users/register/", registration)
            .await
    }

    async fn logout(&self) -> ApiResult<ActionAck> {
        let response = self
            .request(Method::POST, "users/logout/")
            .await?
            .send()
            .await?;
        decode(response).await
    }

    async fn current_user(&self) -> ApiResult<UserProfile> {
        self.get("users/me/").await
    }

    async fn set_auth_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }
}
