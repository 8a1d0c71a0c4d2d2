use std::{collections::HashMap, fmt};

use shared::domain::ResourceFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Fetch,
    Create,
    Update,
    Delete,
    Generate,
    Upload,
    Start,
    Login,
    Register,
    Logout,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Fetch => "fetch",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Generate => "generate",
            OperationKind::Upload => "upload",
            OperationKind::Start => "start",
            OperationKind::Login => "login",
            OperationKind::Register => "register",
            OperationKind::Logout => "logout",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies which store a flight or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Protocols,
    DataFiles,
    AnalysisTasks,
    Visualizations,
    Auth,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Protocols => "protocols",
            StoreKind::DataFiles => "data_files",
            StoreKind::AnalysisTasks => "analysis_tasks",
            StoreKind::Visualizations => "visualizations",
            StoreKind::Auth => "auth",
        }
    }

    pub fn family(self) -> Option<ResourceFamily> {
        match self {
            StoreKind::Protocols => Some(ResourceFamily::Protocol),
            StoreKind::DataFiles => Some(ResourceFamily::DataFile),
            StoreKind::AnalysisTasks => Some(ResourceFamily::AnalysisTask),
            StoreKind::Visualizations => Some(ResourceFamily::Visualization),
            StoreKind::Auth => None,
        }
    }
}

impl From<ResourceFamily> for StoreKind {
    fn from(family: ResourceFamily) -> Self {
        match family {
            ResourceFamily::Protocol => StoreKind::Protocols,
            ResourceFamily::DataFile => StoreKind::DataFiles,
            ResourceFamily::AnalysisTask => StoreKind::AnalysisTasks,
            ResourceFamily::Visualization => StoreKind::Visualizations,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error text used when the server gave nothing structured to show.
pub fn fallback_message(store: StoreKind, kind: OperationKind) -> String {
    match (store.family(), kind) {
        (_, OperationKind::Upload) => "Failed to upload file".to_string(),
        (Some(family), OperationKind::Fetch) => format!("Failed to fetch {}", family.plural()),
        (Some(family), kind) => format!("Failed to {kind} {}", family.singular()),
        (None, OperationKind::Fetch) => "Failed to fetch user profile".to_string(),
        (None, kind) => format!("Failed to {kind}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightToken {
    kind: OperationKind,
    serial: u64,
}

impl FlightToken {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

/// Latest issued request serial per operation kind. A kind is in flight
/// while its latest request has not settled.
#[derive(Debug, Default)]
pub struct FlightTracker {
    next_serial: u64,
    latest: HashMap<OperationKind, u64>,
}

impl FlightTracker {
    pub fn begin(&mut self, kind: OperationKind) -> FlightToken {
        self.next_serial += 1;
        self.latest.insert(kind, self.next_serial);
        FlightToken {
            kind,
            serial: self.next_serial,
        }
    }

    /// Returns `true` when `token` is still the latest of its kind, in which
    /// case the flight is closed and its result may be applied.
    pub fn release(&mut self, token: FlightToken) -> bool {
        if self.latest.get(&token.kind) == Some(&token.serial) {
            self.latest.remove(&token.kind);
            true
        } else {
            false
        }
    }

    /// Abandons the outstanding request of `kind`, so it settles as stale.
    pub fn retire(&mut self, kind: OperationKind) -> bool {
        self.latest.remove(&kind).is_some()
    }

    pub fn is_in_flight(&self, kind: OperationKind) -> bool {
        self.latest.contains_key(&kind)
    }

    pub fn in_flight(&self) -> Vec<OperationKind> {
        let mut kinds: Vec<_> = self.latest.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    pub fn is_idle(&self) -> bool {
        self.latest.is_empty()
    }
}
