use serde::{ser::SerializeMap, Serialize, Serializer};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationStatus {
    #[default]
    Ok,
    Warning,
    Danger,
}

/// One grid row keyed by whatever headers the page carried, plus the fields
/// derived during categorization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EquipmentRecord {
    fields: Vec<(String, String)>,
    pub days_until_calibration: Option<i64>,
    pub calibration_status: CalibrationStatus,
    /// Only ever set on docking stations.
    pub docked_unit: Option<String>,
}

impl EquipmentRecord {
    /// Builds a record from an extracted row. A repeated header keeps its
    /// first position and takes the last value.
    pub fn from_row(row: Vec<(String, String)>) -> Self {
        let mut fields: Vec<(String, String)> = Vec::with_capacity(row.len());
        for (header, value) in row {
            match fields.iter_mut().find(|(existing, _)| *existing == header) {
                Some(slot) => slot.1 = value,
                None => fields.push((header, value)),
            }
        }
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value.as_str())
    }

    /// Missing headers read as the empty string.
    pub fn get_or_empty(&self, header: &str) -> &str {
        self.get(header).unwrap_or("")
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl Serialize for EquipmentRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 3))?;
        for (header, value) in &self.fields {
            map.serialize_entry(header, value)?;
        }
        map.serialize_entry("_daysUntilCalibration", &self.days_until_calibration)?;
        map.serialize_entry("_calibrationStatus", &self.calibration_status)?;
        map.serialize_entry("_dockedUnit", &self.docked_unit)?;
        map.end()
    }
}
