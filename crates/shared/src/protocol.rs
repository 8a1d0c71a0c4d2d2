//! Request payloads and response envelopes exchanged with the research API.

use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

use crate::domain::{
    ChartType, DataFileId, Protocol, ProtocolId, ProtocolStep, Reagent, StepType, TaskType,
    UserProfile,
};

pub const GENERATION_MAX_STEPS: u32 = 20;

/// A list response: either a bare array or a paginated `{results: [...]}` page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page { results: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Page { results } => results,
            Listing::Bare(items) => items,
        }
    }
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(items: Vec<T>) -> Self {
        Listing::Bare(items)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateProtocolRequest {
    pub prompt: String,
    pub include_reagents: bool,
    pub include_reasoning: bool,
    pub max_steps: u32,
}

impl GenerateProtocolRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            include_reagents: true,
            include_reasoning: true,
            max_steps: GENERATION_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStepDraft {
    pub step_number: u32,
    pub step_type: StepType,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<String>,
}

impl From<&ProtocolStep> for ProtocolStepDraft {
    fn from(step: &ProtocolStep) -> Self {
        Self {
            step_number: step.step_number,
            step_type: step.step_type,
            title: step.title.clone(),
            content: step.content.clone(),
            duration_minutes: step.duration_minutes,
            temperature_celsius: step.temperature_celsius.clone(),
        }
    }
}

/// Writable protocol fields, used for both create and full-replace update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDraft {
    pub title: String,
    pub description: String,
    pub is_public: bool,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub original_prompt: String,
    pub steps: Vec<ProtocolStepDraft>,
}

impl From<&Protocol> for ProtocolDraft {
    fn from(protocol: &Protocol) -> Self {
        Self {
            title: protocol.title.clone(),
            description: protocol.description.clone(),
            is_public: protocol.is_public,
            tags: protocol.tags.clone(),
            original_prompt: protocol.original_prompt.clone(),
            steps: protocol.steps.iter().map(ProtocolStepDraft::from).collect(),
        }
    }
}

/// Body of a protocol create or update response. The write endpoints echo the
/// writable fields and may leave out `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedProtocol {
    #[serde(default)]
    pub id: Option<ProtocolId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<ProtocolStep>,
    #[serde(default)]
    pub reagents: Vec<Reagent>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub original_prompt: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SavedProtocol {
    /// The protocol under its echoed id, if the server sent one.
    pub fn identified(self) -> Option<Protocol> {
        let id = self.id?;
        Some(self.into_protocol(id))
    }

    /// The protocol under `id`; an echoed id takes precedence.
    pub fn into_protocol(self, id: ProtocolId) -> Protocol {
        Protocol {
            id: self.id.unwrap_or(id),
            title: self.title,
            description: self.description,
            steps: self.steps,
            reagents: self.reagents,
            is_public: self.is_public,
            tags: self.tags,
            original_prompt: self.original_prompt,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTaskRequest {
    pub name: String,
    pub task_type: TaskType,
    pub data_files: Vec<DataFileId>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationUpdate {
    pub title: String,
    pub chart_type: ChartType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Acknowledgement body returned by action endpoints (`start`, `logout`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionAck {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_list_and_results_page_normalize_to_the_same_items() {
        let bare: Listing<u32> = serde_json::from_value(json!([3, 1, 2])).expect("bare");
        let page: Listing<u32> =
            serde_json::from_value(json!({"count": 3, "next": null, "results": [3, 1, 2]}))
                .expect("page");
        assert_eq!(bare.into_items(), page.into_items());
    }

    #[test]
    fn generation_request_carries_fixed_options() {
        let body = serde_json::to_value(GenerateProtocolRequest::new("PCR protocol")).unwrap();
        assert_eq!(
            body,
            json!({
                "prompt": "PCR protocol",
                "include_reagents": true,
                "include_reasoning": true,
                "max_steps": 20,
            })
        );
    }

    #[test]
    fn write_response_without_id_decodes_and_takes_the_path_id() {
        let body = json!({
            "title": "My PCR",
            "description": "",
            "is_public": false,
            "tags": [],
            "original_prompt": "PCR protocol",
            "steps": [{
                "step_number": 1,
                "step_type": "action",
                "title": "Thaw reagents",
                "content": "On ice",
                "duration_minutes": 10,
                "temperature_celsius": "4.0"
            }]
        });
        let saved: SavedProtocol = serde_json::from_value(body).expect("id-less body decodes");
        assert_eq!(saved.id, None);
        assert_eq!(saved.clone().identified(), None);

        let id = ProtocolId(uuid::Uuid::from_u128(31));
        let protocol = saved.into_protocol(id);
        assert_eq!(protocol.id, id);
        assert_eq!(protocol.title, "My PCR");
        assert_eq!(protocol.steps[0].temperature_celsius.as_deref(), Some("4.0"));
    }

    #[test]
    fn echoed_id_wins_over_the_fallback() {
        let echoed = ProtocolId(uuid::Uuid::from_u128(7));
        let saved: SavedProtocol =
            serde_json::from_value(json!({"id": echoed, "title": "Western blot"}))
                .expect("decodes");
        assert_eq!(saved.clone().identified().map(|p| p.id), Some(echoed));
        assert_eq!(
            saved.into_protocol(ProtocolId(uuid::Uuid::from_u128(8))).id,
            echoed
        );
    }

    #[test]
    fn analysis_request_serializes_empty_parameters_object() {
        let request = AnalysisTaskRequest {
            name: "run 1".into(),
            task_type: TaskType::QpcrDeltaCt,
            data_files: vec![DataFileId(uuid::Uuid::from_u128(9))],
            parameters: Default::default(),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["parameters"], json!({}));
        assert_eq!(body["task_type"], json!("qpcr_delta_ct"));
    }
}
