use chrono::{DateTime, Utc};
use serde::Serialize;

use super::EquipmentRecord;

/// A fully categorized view of one successful refresh.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub instruments: Vec<EquipmentRecord>,
    pub docking_stations: Vec<EquipmentRecord>,
    pub last_update: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Snapshot {
    /// The placeholder held before the first successful refresh.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        !self.instruments.is_empty() || !self.docking_stations.is_empty()
    }
}
