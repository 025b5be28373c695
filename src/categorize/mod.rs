pub mod calibration;

use chrono::NaiveDateTime;
use std::collections::HashMap;

use crate::{
    extract::Row,
    models::{CalibrationStatus, EquipmentRecord},
    settings::FieldNames,
};

const INSTRUMENT: &str = "instrument";
const DOCKING_STATION: &str = "docking station";
/// Shown when a docked instrument has no group of its own.
const UNKNOWN_UNIT: &str = "N/A";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Categorized {
    pub instruments: Vec<EquipmentRecord>,
    pub docking_stations: Vec<EquipmentRecord>,
}

/// Splits extracted rows into instruments and docking stations, derives the
/// calibration urgency and docked unit, and orders the instruments.
pub fn categorize(rows: Vec<Row>, fields: &FieldNames, now: NaiveDateTime) -> Categorized {
    let mut out = Categorized::default();

    for row in rows {
        let mut record = EquipmentRecord::from_row(row);
        apply_calibration(&mut record, &fields.calibration_date, now);

        let category = record.get_or_empty(&fields.category).trim();
        let is_instrument = category.eq_ignore_ascii_case(INSTRUMENT);
        let is_station = category.eq_ignore_ascii_case(DOCKING_STATION);
        if is_instrument {
            out.instruments.push(record);
        } else if is_station {
            out.docking_stations.push(record);
        }
    }

    out.instruments.sort_by(|a, b| {
        let key_a = (
            a.get_or_empty(&fields.equipment_group),
            a.get_or_empty(&fields.equipment_type),
        );
        let key_b = (
            b.get_or_empty(&fields.equipment_group),
            b.get_or_empty(&fields.equipment_type),
        );
        key_a.cmp(&key_b)
    });

    link_docked_units(&out.instruments, &mut out.docking_stations, fields);
    out
}

fn apply_calibration(record: &mut EquipmentRecord, field: &str, now: NaiveDateTime) {
    record.days_until_calibration = None;
    record.calibration_status = CalibrationStatus::Ok;

    let Some(raw) = record.get(field).filter(|raw| !raw.trim().is_empty()) else {
        return;
    };
    match calibration::assess(raw, now) {
        Some((days, status)) => {
            record.days_until_calibration = Some(days);
            record.calibration_status = status;
        }
        None => log::debug!("unrecognised calibration date '{raw}'"),
    }
}

fn link_docked_units(
    instruments: &[EquipmentRecord],
    stations: &mut [EquipmentRecord],
    fields: &FieldNames,
) {
    let mut by_serial: HashMap<&str, &EquipmentRecord> = HashMap::new();
    for instrument in instruments {
        let serial = instrument.get_or_empty(&fields.serial_number);
        if !serial.is_empty() {
            by_serial.insert(serial, instrument);
        }
    }

    for station in stations.iter_mut() {
        let docked = station.get_or_empty(&fields.currently_docked).trim();
        let unit = if docked.is_empty() {
            None
        } else {
            by_serial.get(docked).map(|instrument| {
                instrument
                    .get(&fields.equipment_group)
                    .unwrap_or(UNKNOWN_UNIT)
                    .to_string()
            })
        };
        station.docked_unit = unit;
    }
}
