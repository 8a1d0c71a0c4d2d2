//! File-selection helpers: suffix classification, accepted sets and the
//! multipart payload shapes sent by the gateway.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Local};
use shared::domain::{ChartType, DataFile, DataFileId, DataFileKind};

pub const CSV_MIME: &str = "text/csv";
pub const TIFF_MIME: &str = "image/tiff";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const JSON_MIME: &str = "application/json";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// A user-selected file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
}

impl FileAttachment {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_for(&file_name).map(str::to_string);
        Self {
            file_name,
            mime_type,
            content: content.into(),
        }
    }

    pub fn mime_or_default(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(OCTET_STREAM_MIME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileUpload {
    pub file: FileAttachment,
    pub name: String,
    pub file_type: DataFileKind,
    pub description: String,
}

impl DataFileUpload {
    pub fn from_selection(file: FileAttachment, uploaded_at: DateTime<Local>) -> Self {
        Self {
            name: file.file_name.clone(),
            file_type: classify_file_kind(&file.file_name),
            description: upload_description(uploaded_at),
            file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationDraft {
    pub title: String,
    pub chart_type: ChartType,
    pub x_axis_label: String,
    pub y_axis_label: String,
    pub data_files: Vec<FileAttachment>,
}

/// Case-sensitive suffix match.
pub fn classify_file_kind(file_name: &str) -> DataFileKind {
    if file_name.ends_with(".csv") {
        DataFileKind::QpcrCsv
    } else if file_name.ends_with(".tif") || file_name.ends_with(".tiff") {
        DataFileKind::WesternTiff
    } else if file_name.ends_with(".xlsx") {
        DataFileKind::Excel
    } else {
        DataFileKind::Other
    }
}

pub fn upload_description(uploaded_at: DateTime<Local>) -> String {
    format!("Uploaded {}", uploaded_at.format("%Y-%m-%d %H:%M:%S"))
}

pub fn mime_for(file_name: &str) -> Option<&'static str> {
    if file_name.ends_with(".csv") {
        Some(CSV_MIME)
    } else if file_name.ends_with(".tif") || file_name.ends_with(".tiff") {
        Some(TIFF_MIME)
    } else if file_name.ends_with(".xlsx") {
        Some(XLSX_MIME)
    } else if file_name.ends_with(".json") {
        Some(JSON_MIME)
    } else {
        None
    }
}

/// Where a selection is headed; each destination accepts its own MIME set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Analysis,
    Visualization,
}

impl UploadTarget {
    pub fn accepted_mime_types(self) -> &'static [&'static str] {
        match self {
            UploadTarget::Analysis => &[CSV_MIME, TIFF_MIME, XLSX_MIME],
            UploadTarget::Visualization => &[XLSX_MIME, CSV_MIME, JSON_MIME],
        }
    }

    pub fn accepts(self, file_name: &str) -> bool {
        mime_for(file_name).is_some_and(|mime| self.accepted_mime_types().contains(&mime))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPolicy {
    /// Keep uploading the rest of the batch after a failure.
    #[default]
    BestEffort,
    AbortOnFailure,
}

impl UploadPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadPolicy::BestEffort => "best_effort",
            UploadPolicy::AbortOnFailure => "abort_on_failure",
        }
    }
}

impl fmt::Display for UploadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "best_effort" => Ok(UploadPolicy::BestEffort),
            "abort_on_failure" => Ok(UploadPolicy::AbortOnFailure),
            other => Err(format!("unknown upload policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub file_name: String,
    pub message: String,
}

/// Outcome of one sequential upload batch, in selection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    pub uploaded: Vec<DataFile>,
    pub failed: Vec<UploadFailure>,
    /// Accepted by the server but overtaken by a newer upload before it
    /// settled; these appear after the next data-file fetch.
    pub superseded: Vec<String>,
    /// Never sent because an earlier upload failed under
    /// [`UploadPolicy::AbortOnFailure`].
    pub skipped: Vec<String>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn uploaded_ids(&self) -> Vec<DataFileId> {
        self.uploaded.iter().map(|file| file.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn classifies_by_case_sensitive_suffix() {
        assert_eq!(classify_file_kind("plate1.csv"), DataFileKind::QpcrCsv);
        assert_eq!(classify_file_kind("blot.tif"), DataFileKind::WesternTiff);
        assert_eq!(classify_file_kind("blot.tiff"), DataFileKind::WesternTiff);
        assert_eq!(classify_file_kind("sheet.xlsx"), DataFileKind::Excel);
        assert_eq!(classify_file_kind("PLATE1.CSV"), DataFileKind::Other);
        assert_eq!(classify_file_kind("notes.txt"), DataFileKind::Other);
    }

    #[test]
    fn description_embeds_upload_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(upload_description(at), "Uploaded 2024-03-09 14:05:07");
    }

    #[test]
    fn targets_accept_their_own_suffix_sets() {
        assert!(UploadTarget::Analysis.accepts("a.tiff"));
        assert!(!UploadTarget::Analysis.accepts("series.json"));
        assert!(UploadTarget::Visualization.accepts("series.json"));
        assert!(!UploadTarget::Visualization.accepts("blot.tif"));
        assert!(!UploadTarget::Visualization.accepts("readme"));
    }

    #[test]
    fn selection_builds_named_classified_upload() {
        let at = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let upload =
            DataFileUpload::from_selection(FileAttachment::new("b.tiff", b"II*".to_vec()), at);
        assert_eq!(upload.name, "b.tiff");
        assert_eq!(upload.file_type, DataFileKind::WesternTiff);
        assert_eq!(upload.file.mime_or_default(), TIFF_MIME);
        assert!(upload.description.starts_with("Uploaded "));
    }

    #[test]
    fn policy_parses_from_config_text() {
        assert_eq!(
            "abort_on_failure".parse::<UploadPolicy>(),
            Ok(UploadPolicy::AbortOnFailure)
        );
        assert!("sometimes".parse::<UploadPolicy>().is_err());
    }
}
