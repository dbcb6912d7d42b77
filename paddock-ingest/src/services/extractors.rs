//! Sub-dataset extraction from one fetched session blob
//!
//! The provider returns a single JSON document per session with an optional
//! section per sub-dataset kind. Each kind is extracted independently; a
//! missing or unusable section fails that kind only.

use crate::models::SubDatasetKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Extraction failure for one kind
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no {0} section in session data")]
    MissingSection(SubDatasetKind),

    #[error("{kind} section has no usable entries: {detail}")]
    NoUsableEntries { kind: SubDatasetKind, detail: String },

    #[error("failed to encode {kind} payload: {source}")]
    Encode {
        kind: SubDatasetKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw session document as returned by the telemetry provider
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionBlob {
    pub results: Option<Vec<DriverResult>>,
    pub weather: Option<Vec<WeatherSample>>,
    pub circuit: Option<CircuitInfo>,
    pub laps: Option<Vec<LapRecord>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverResult {
    pub driver_number: Option<String>,
    pub abbreviation: Option<String>,
    pub full_name: Option<String>,
    pub team_name: Option<String>,
    pub team_color: Option<String>,
    pub position: Option<u32>,
    pub grid_position: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WeatherSample {
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub rainfall: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitInfo {
    pub rotation: Option<f64>,
    pub corners: Vec<CircuitMarker>,
    pub marshal_lights: Vec<CircuitMarker>,
    pub marshal_sectors: Vec<CircuitMarker>,
}

/// Corner, marshal light or marshal sector position
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitMarker {
    pub number: u32,
    pub letter: String,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LapRecord {
    pub driver_number: Option<String>,
    pub driver: Option<String>,
    pub lap_number: u32,
    pub lap_time: Option<f64>,
    pub sector1_time: Option<f64>,
    pub sector2_time: Option<f64>,
    pub sector3_time: Option<f64>,
    pub compound: Option<String>,
    pub tyre_life: Option<u32>,
    /// Session time (seconds) the car entered the pit lane
    pub pit_in_time: Option<f64>,
    /// Session time (seconds) the car left the pit lane
    pub pit_out_time: Option<f64>,
}

/// Stored payload for `drivers`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriversPayload {
    pub drivers: Vec<DriverEntry>,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverEntry {
    pub driver_number: String,
    pub full_name: String,
    pub abbreviation: String,
    pub team_name: String,
    pub team_color: String,
    pub position: Option<u32>,
    pub grid_position: Option<u32>,
    pub status: String,
}

/// Stored payload for `weather`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub air_temperature: Option<f64>,
    pub track_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<i64>,
    pub rainfall: bool,
    pub samples: usize,
}

/// Stored payload for `circuit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitPayload {
    pub rotation: Option<f64>,
    pub corners: Vec<CircuitMarker>,
    pub marshal_lights: Vec<CircuitMarker>,
    pub marshal_sectors: Vec<CircuitMarker>,
}

/// Stored payload for `laps`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapsPayload {
    pub laps: Vec<LapRecord>,
    pub pit_stops: Vec<PitStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitStop {
    pub driver: String,
    /// 1-based per driver, in lap order
    pub stop_number: u32,
    pub lap_number: u32,
    pub pit_in_time: f64,
    pub pit_out_time: f64,
    pub pit_duration: f64,
}

/// Extract one kind from the blob as a JSON payload ready to persist
pub fn extract(kind: SubDatasetKind, blob: &SessionBlob) -> Result<serde_json::Value, ExtractionError> {
    let encoded = match kind {
        SubDatasetKind::Drivers => serde_json::to_value(extract_drivers(blob)?),
        SubDatasetKind::Weather => serde_json::to_value(extract_weather(blob)?),
        SubDatasetKind::Circuit => serde_json::to_value(extract_circuit(blob)?),
        SubDatasetKind::Laps => serde_json::to_value(extract_laps(blob)?),
    };
    encoded.map_err(|source| ExtractionError::Encode { kind, source })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn extract_drivers(blob: &SessionBlob) -> Result<DriversPayload, ExtractionError> {
    let results = blob
        .results
        .as_ref()
        .ok_or(ExtractionError::MissingSection(SubDatasetKind::Drivers))?;

    let mut drivers = Vec::with_capacity(results.len());
    let mut skipped = 0;
    for result in results {
        let (Some(number), Some(name)) = (non_empty(&result.driver_number), non_empty(&result.full_name)) else {
            tracing::warn!(
                driver_number = ?result.driver_number,
                full_name = ?result.full_name,
                "Skipping driver entry without number or name"
            );
            skipped += 1;
            continue;
        };

        drivers.push(DriverEntry {
            driver_number: number.to_string(),
            full_name: name.to_string(),
            abbreviation: non_empty(&result.abbreviation).unwrap_or_default().to_string(),
            team_name: non_empty(&result.team_name).unwrap_or_default().to_string(),
            team_color: non_empty(&result.team_color).unwrap_or_default().to_string(),
            position: result.position,
            grid_position: result.grid_position,
            status: non_empty(&result.status).unwrap_or_default().to_string(),
        });
    }

    if drivers.is_empty() {
        return Err(ExtractionError::NoUsableEntries {
            kind: SubDatasetKind::Drivers,
            detail: format!("{} entries, all missing number or name", results.len()),
        });
    }

    Ok(DriversPayload { drivers, skipped })
}

/// Median of the finite values, averaging the middle pair for even counts
fn median(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let mut values: Vec<f64> = values.flatten().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

pub fn extract_weather(blob: &SessionBlob) -> Result<WeatherSummary, ExtractionError> {
    let samples = blob
        .weather
        .as_ref()
        .ok_or(ExtractionError::MissingSection(SubDatasetKind::Weather))?;

    if samples.is_empty() {
        return Err(ExtractionError::NoUsableEntries {
            kind: SubDatasetKind::Weather,
            detail: "no samples".to_string(),
        });
    }

    Ok(WeatherSummary {
        air_temperature: median(samples.iter().map(|s| s.air_temp)),
        track_temperature: median(samples.iter().map(|s| s.track_temp)),
        humidity: median(samples.iter().map(|s| s.humidity)),
        pressure: median(samples.iter().map(|s| s.pressure)),
        wind_speed: median(samples.iter().map(|s| s.wind_speed)),
        wind_direction: median(samples.iter().map(|s| s.wind_direction)).map(|d| d.trunc() as i64),
        rainfall: samples.iter().any(|s| s.rainfall.unwrap_or(false)),
        samples: samples.len(),
    })
}

pub fn extract_circuit(blob: &SessionBlob) -> Result<CircuitPayload, ExtractionError> {
    let circuit = blob
        .circuit
        .as_ref()
        .ok_or(ExtractionError::MissingSection(SubDatasetKind::Circuit))?;

    if circuit.corners.is_empty() && circuit.marshal_lights.is_empty() && circuit.marshal_sectors.is_empty() {
        return Err(ExtractionError::NoUsableEntries {
            kind: SubDatasetKind::Circuit,
            detail: "no corners, marshal lights or marshal sectors".to_string(),
        });
    }

    Ok(CircuitPayload {
        rotation: circuit.rotation,
        corners: circuit.corners.clone(),
        marshal_lights: circuit.marshal_lights.clone(),
        marshal_sectors: circuit.marshal_sectors.clone(),
    })
}

pub fn extract_laps(blob: &SessionBlob) -> Result<LapsPayload, ExtractionError> {
    let laps = blob
        .laps
        .as_ref()
        .ok_or(ExtractionError::MissingSection(SubDatasetKind::Laps))?;

    if laps.is_empty() {
        return Err(ExtractionError::NoUsableEntries {
            kind: SubDatasetKind::Laps,
            detail: "no laps".to_string(),
        });
    }

    Ok(LapsPayload {
        pit_stops: derive_pit_stops(laps),
        laps: laps.clone(),
    })
}

/// Pit stops from lap timing
///
/// A stop starts on a lap with a pit-in time. The matching pit-out time sits
/// on the same lap or on the driver's next lap. Stops whose out time does not
/// follow the in time are dropped.
pub fn derive_pit_stops(laps: &[LapRecord]) -> Vec<PitStop> {
    let mut by_driver: BTreeMap<String, Vec<&LapRecord>> = BTreeMap::new();
    for lap in laps {
        let Some(driver) = non_empty(&lap.driver).or_else(|| non_empty(&lap.driver_number)) else {
            continue;
        };
        by_driver.entry(driver.to_string()).or_default().push(lap);
    }

    let mut stops = Vec::new();
    for (driver, mut driver_laps) in by_driver {
        driver_laps.sort_by_key(|lap| lap.lap_number);

        let mut stop_number = 0;
        for (i, lap) in driver_laps.iter().enumerate() {
            let Some(pit_in) = lap.pit_in_time else {
                continue;
            };
            let pit_out = lap
                .pit_out_time
                .or_else(|| driver_laps.get(i + 1).and_then(|next| next.pit_out_time));

            match pit_out {
                Some(pit_out) if pit_out > pit_in => {
                    stop_number += 1;
                    stops.push(PitStop {
                        driver: driver.clone(),
                        stop_number,
                        lap_number: lap.lap_number,
                        pit_in_time: pit_in,
                        pit_out_time: pit_out,
                        pit_duration: pit_out - pit_in,
                    });
                }
                _ => {}
            }
        }
    }

    stops
}
