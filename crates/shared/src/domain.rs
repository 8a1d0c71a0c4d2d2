use std::{
    fmt::{self, Debug, Display},
    hash::Hash,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::ParseTagError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_newtype!(ProtocolId);
id_newtype!(DataFileId);
id_newtype!(TaskId);
id_newtype!(VisualizationId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Declares a closed set of wire tags with `as_str`, `Display` and `FromStr`.
macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $tag)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $tag,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseTagError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => Err(ParseTagError::new(stringify!($name), other)),
                }
            }
        }
    };
}

tag_enum!(
    /// Server-side file classification. `Csv` only ever arrives from the server.
    DataFileKind {
        QpcrCsv => "qpc_csv",
        WesternTiff => "western_tiff",
        Excel => "excel",
        Csv => "csv",
        Other => "other",
    }
);

tag_enum!(
    TaskType {
        QpcrDeltaCt => "qpcr_delta_ct",
        QpcrDeltaDeltaCt => "qpcr_delta_delta_ct",
        WesternQuantification => "western_quantification",
        WesternNormalization => "western_normalization",
        Custom => "custom",
    }
);

impl TaskType {
    /// Analysis types a user may pick when creating a task.
    pub const SELECTABLE: [TaskType; 4] = [
        TaskType::QpcrDeltaCt,
        TaskType::QpcrDeltaDeltaCt,
        TaskType::WesternQuantification,
        TaskType::WesternNormalization,
    ];

    pub fn is_selectable(self) -> bool {
        Self::SELECTABLE.contains(&self)
    }
}

tag_enum!(
    TaskStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
);

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

tag_enum!(
    ChartType {
        Bar => "bar",
        Line => "line",
        Scatter => "scatter",
        Pie => "pie",
        Heatmap => "heatmap",
    }
);

impl ChartType {
    pub const SELECTABLE: [ChartType; 3] = [ChartType::Bar, ChartType::Line, ChartType::Scatter];
}

impl Default for ChartType {
    fn default() -> Self {
        ChartType::Bar
    }
}

tag_enum!(
    StepType {
        Action => "action",
        Reagent => "reagent",
        Note => "note",
        Calculation => "calculation",
    }
);

impl Default for StepType {
    fn default() -> Self {
        StepType::Action
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceFamily {
    Protocol,
    DataFile,
    AnalysisTask,
    Visualization,
}

impl ResourceFamily {
    pub fn singular(self) -> &'static str {
        match self {
            ResourceFamily::Protocol => "protocol",
            ResourceFamily::DataFile => "data file",
            ResourceFamily::AnalysisTask => "analysis task",
            ResourceFamily::Visualization => "visualization",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ResourceFamily::Protocol => "protocols",
            ResourceFamily::DataFile => "data files",
            ResourceFamily::AnalysisTask => "analysis tasks",
            ResourceFamily::Visualization => "visualizations",
        }
    }
}

/// A server-identified record that lives in a client-side collection.
pub trait Resource: Clone + Debug + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;

    const FAMILY: ResourceFamily;

    fn id(&self) -> Self::Id;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reagent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub concentration: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub step_number: u32,
    #[serde(default)]
    pub step_type: StepType,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default, deserialize_with = "decimal_text")]
    pub temperature_celsius: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub reagents: Vec<Reagent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: ProtocolId,
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

impl Resource for Protocol {
    type Id = ProtocolId;
    const FAMILY: ResourceFamily = ResourceFamily::Protocol;

    fn id(&self) -> ProtocolId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub id: DataFileId,
    pub name: String,
    pub file_type: DataFileKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_processed: bool,
    #[serde(default)]
    pub processing_error: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl Resource for DataFile {
    type Id = DataFileId;
    const FAMILY: ResourceFamily = ResourceFamily::DataFile;

    fn id(&self) -> DataFileId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: TaskId,
    pub name: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub result_data: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Resource for AnalysisTask {
    type Id = TaskId;
    const FAMILY: ResourceFamily = ResourceFamily::AnalysisTask;

    fn id(&self) -> TaskId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub id: VisualizationId,
    pub title: String,
    pub chart_type: ChartType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chart_config: serde_json::Value,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Visualization {
    type Id = VisualizationId;
    const FAMILY: ResourceFamily = ResourceFamily::Visualization;

    fn id(&self) -> VisualizationId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

// DRF renders decimals as strings by default but numbers are accepted too.
fn decimal_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) => Ok(Some(text)),
        Some(serde_json::Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected decimal string or number, got {other}"
        ))),
    }
}
