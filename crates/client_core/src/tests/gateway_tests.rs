use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use shared::{
    domain::{ChartType, DataFileKind, ProtocolId, StepType, VisualizationId},
    protocol::{GenerateProtocolRequest, ProtocolDraft, ProtocolStepDraft},
};
use tokio::{net::TcpListener, sync::Mutex};
use uuid::Uuid;

use crate::{
    error::GatewayError,
    gateway::{HttpGateway, ResearchApi},
    upload::{DataFileUpload, FileAttachment, VisualizationDraft, CSV_MIME, JSON_MIME},
};

#[derive(Debug, Clone, PartialEq)]
struct CapturedPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct GatewayServerState {
    parts: Arc<Mutex<Vec<CapturedPart>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    generate_requests: Arc<Mutex<Vec<Value>>>,
}

const PROTOCOL_ID: u128 = 0x11;
const FILE_ID: u128 = 0x22;
const VIZ_ID: u128 = 0x33;

fn protocol_json(id: u128, title: &str) -> Value {
    json!({
        "id": Uuid::from_u128(id),
        "title": title,
        "description": "",
        "steps": [],
        "reagents": [],
        "is_public": false,
        "created_at": "2024-05-01T10:00:00Z"
    })
}

async fn list_protocols_page() -> Json<Value> {
    Json(json!({
        "count": 2,
        "next": null,
        "previous": null,
        "results": [protocol_json(PROTOCOL_ID, "Western blot"), protocol_json(0x12, "qPCR")]
    }))
}

/// The protocol write endpoints echo the writable fields only.
async fn echo_protocol_fields(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "title": body["title"],
        "description": body["description"],
        "is_public": body["is_public"],
        "tags": body["tags"],
        "steps": body["steps"],
    }))
}

async fn list_visualizations_bare() -> Json<Value> {
    Json(json!([
        {"id": Uuid::from_u128(VIZ_ID), "title": "Expression", "chart_type": "heatmap"}
    ]))
}

async fn generate_protocol(
    State(state): State<GatewayServerState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.generate_requests.lock().await.push(body.clone());
    if body["prompt"].as_str().map(str::len).unwrap_or_default() < 10 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Prompt must be at least 10 characters long."})),
        );
    }
    (StatusCode::OK, Json(protocol_json(0x99, "Generated")))
}

async fn list_tasks_broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "<h1>Server Error (500)</h1>")
}

async fn create_task_invalid() -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"data_files": ["This list may not be empty."]})),
    )
}

async fn capture_multipart(
    state: &GatewayServerState,
    mut multipart: Multipart,
) -> Result<(), StatusCode> {
    let mut parts = state.parts.lock().await;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?
            .to_vec();
        parts.push(CapturedPart {
            name,
            file_name,
            content_type,
            body,
        });
    }
    Ok(())
}

async fn upload_file(
    State(state): State<GatewayServerState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    capture_multipart(&state, multipart).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": Uuid::from_u128(FILE_ID),
            "name": "plate1.csv",
            "file_type": "qpc_csv",
            "is_processed": false,
            "file_size": 12
        })),
    ))
}

async fn create_visualization(
    State(state): State<GatewayServerState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    capture_multipart(&state, multipart).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"id": Uuid::from_u128(VIZ_ID), "title": "Ct values", "chart_type": "line"})),
    ))
}

async fn delete_visualization(
    State(state): State<GatewayServerState>,
    Path(id): Path<String>,
) -> StatusCode {
    state.deleted.lock().await.push(id);
    StatusCode::NO_CONTENT
}

async fn current_user(headers: HeaderMap) -> impl IntoResponse {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Token secret-key") => (
            StatusCode::OK,
            Json(json!({"id": 7, "username": "ada", "email": "ada@lab.example"})),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Authentication credentials were not provided."})),
        ),
    }
}

async fn spawn_gateway_server() -> Result<(String, GatewayServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = GatewayServerState::default();
    let app = Router::new()
        .route(
            "/api/v1/protocols/",
            get(list_protocols_page).post(echo_protocol_fields),
        )
        .route("/api/v1/protocols/:id/", put(echo_protocol_fields))
        .route("/api/v1/protocols/generate/", post(generate_protocol))
        .route("/api/v1/analysis/files/", post(upload_file))
        .route(
            "/api/v1/analysis/tasks/",
            get(list_tasks_broken).post(create_task_invalid),
        )
        .route(
            "/api/v1/visualization/",
            get(list_visualizations_bare).post(create_visualization),
        )
        .route("/api/v1/visualization/:id/", delete(delete_visualization))
        .route("/api/v1/users/me/", get(current_user))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api/v1"), state))
}

#[tokio::test]
async fn paginated_and_bare_listings_both_decode() {
    let (base_url, _state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");

    let protocols = gateway
        .list_protocols()
        .await
        .expect("protocols")
        .into_items();
    assert_eq!(protocols.len(), 2);
    assert_eq!(protocols[0].id, ProtocolId(Uuid::from_u128(PROTOCOL_ID)));
    assert_eq!(protocols[1].title, "qPCR");

    let visualizations = gateway
        .list_visualizations()
        .await
        .expect("visualizations")
        .into_items();
    assert_eq!(visualizations.len(), 1);
    assert_eq!(visualizations[0].chart_type, ChartType::Heatmap);
}

#[tokio::test]
async fn protocol_writes_decode_without_an_echoed_id() {
    let (base_url, _state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");
    let draft = ProtocolDraft {
        title: "My PCR".into(),
        description: String::new(),
        is_public: false,
        tags: Vec::new(),
        original_prompt: "PCR protocol".into(),
        steps: vec![ProtocolStepDraft {
            step_number: 1,
            step_type: StepType::Action,
            title: "Denature".into(),
            content: "Heat the plate".into(),
            duration_minutes: Some(3),
            temperature_celsius: Some("95.0".into()),
        }],
    };

    let created = gateway.create_protocol(&draft).await.expect("create");
    assert_eq!(created.id, None);
    assert_eq!(created.title, "My PCR");
    assert_eq!(created.steps.len(), 1);

    let id = ProtocolId(Uuid::from_u128(PROTOCOL_ID));
    let updated = gateway.update_protocol(id, &draft).await.expect("update");
    assert_eq!(updated.id, id);
    assert_eq!(updated.title, "My PCR");
    assert_eq!(updated.steps[0].temperature_celsius.as_deref(), Some("95.0"));
}

#[tokio::test]
async fn generate_sends_fixed_options_and_surfaces_structured_error() {
    let (base_url, state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");

    let generated = gateway
        .generate_protocol(&GenerateProtocolRequest::new("PCR protocol"))
        .await
        .expect("generate");
    assert_eq!(generated.title, "Generated");

    let err = gateway
        .generate_protocol(&GenerateProtocolRequest::new("PCR"))
        .await
        .expect_err("short prompt must be rejected");
    match err {
        GatewayError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Prompt must be at least 10 characters long.");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let requests = state.generate_requests.lock().await.clone();
    assert_eq!(
        requests[0],
        json!({
            "prompt": "PCR protocol",
            "include_reagents": true,
            "include_reasoning": true,
            "max_steps": 20
        })
    );
}

#[tokio::test]
async fn unstructured_failure_keeps_only_the_status() {
    let (base_url, _state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");

    let err = gateway
        .list_analysis_tasks()
        .await
        .expect_err("must fail");
    assert!(matches!(err, GatewayError::Status { status: 500 }));
    assert_eq!(
        err.store_message("Failed to fetch analysis tasks"),
        "Failed to fetch analysis tasks"
    );
}

#[tokio::test]
async fn field_error_map_is_rendered_as_json_text() {
    let (base_url, _state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");

    let request = shared::protocol::AnalysisTaskRequest {
        name: "run".into(),
        task_type: shared::domain::TaskType::QpcrDeltaCt,
        data_files: Vec::new(),
        parameters: serde_json::Map::new(),
    };
    let err = gateway
        .create_analysis_task(&request)
        .await
        .expect_err("must fail");
    assert_eq!(
        err.store_message("Failed to create analysis task"),
        r#"{"data_files":["This list may not be empty."]}"#
    );
}

#[tokio::test]
async fn upload_sends_one_multipart_request_with_classified_fields() {
    let (base_url, state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");
    let at = Local.with_ymd_and_hms(2024, 6, 2, 9, 30, 0).unwrap();
    let upload = DataFileUpload::from_selection(
        FileAttachment::new("plate1.csv", b"Well,Ct\nA1,21.4\n".to_vec()),
        at,
    );

    let stored = gateway.upload_data_file(&upload).await.expect("upload");
    assert_eq!(stored.file_type, DataFileKind::QpcrCsv);

    let parts = state.parts.lock().await.clone();
    let names: Vec<_> = parts.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(names, vec!["file", "name", "file_type", "description"]);
    assert_eq!(parts[0].file_name.as_deref(), Some("plate1.csv"));
    assert_eq!(parts[0].content_type.as_deref(), Some(CSV_MIME));
    assert_eq!(parts[0].body, b"Well,Ct\nA1,21.4\n".to_vec());
    assert_eq!(parts[2].body, b"qpc_csv".to_vec());
    assert_eq!(parts[3].body, b"Uploaded 2024-06-02 09:30:00".to_vec());
}

#[tokio::test]
async fn visualization_attaches_every_file_to_a_single_request() {
    let (base_url, state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");
    let draft = VisualizationDraft {
        title: "Ct values".into(),
        chart_type: ChartType::Line,
        x_axis_label: "Cycle".into(),
        y_axis_label: "Fluorescence".into(),
        data_files: vec![
            FileAttachment::new("run1.csv", b"a".to_vec()),
            FileAttachment::new("run2.json", b"[]".to_vec()),
        ],
    };

    let created = gateway.create_visualization(&draft).await.expect("create");
    assert_eq!(created.id, VisualizationId(Uuid::from_u128(VIZ_ID)));

    let parts = state.parts.lock().await.clone();
    let names: Vec<_> = parts.iter().map(|part| part.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "title",
            "chart_type",
            "x_axis_label",
            "y_axis_label",
            "data_files",
            "data_files"
        ]
    );
    assert_eq!(parts[1].body, b"line".to_vec());
    assert_eq!(parts[5].file_name.as_deref(), Some("run2.json"));
    assert_eq!(parts[5].content_type.as_deref(), Some(JSON_MIME));
}

#[tokio::test]
async fn delete_targets_the_item_path() {
    let (base_url, state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");
    let id = VisualizationId(Uuid::from_u128(VIZ_ID));

    gateway.delete_visualization(id).await.expect("delete");

    assert_eq!(*state.deleted.lock().await, vec![id.to_string()]);
}

#[tokio::test]
async fn token_is_sent_once_set_and_dropped_when_cleared() {
    let (base_url, _state) = spawn_gateway_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&base_url).expect("gateway");

    let err = gateway.current_user().await.expect_err("anonymous");
    assert_eq!(err.status(), Some(401));
    assert_eq!(
        err.store_message("Failed to fetch user profile"),
        "Authentication credentials were not provided."
    );

    gateway.set_auth_token(Some("secret-key".into())).await;
    let user = gateway.current_user().await.expect("signed in");
    assert_eq!(user.username, "ada");

    gateway.set_auth_token(None).await;
    assert!(gateway.current_user().await.is_err());
}

#[test]
fn base_url_gains_trailing_slash_so_paths_join_under_it() {
    let gateway = HttpGateway::new("http://127.0.0.1:8000/api/v1").expect("gateway");
    assert_eq!(gateway.base_url().as_str(), "http://127.0.0.1:8000/api/v1/");
}
