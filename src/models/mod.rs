pub mod record;
pub mod snapshot;

pub use record::{CalibrationStatus, EquipmentRecord};
pub use snapshot::Snapshot;
