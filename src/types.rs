use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Normal,
    Suspicious,
    Stolen,
}

impl Default for VehicleStatus {
    fn default() -> Self {
        VehicleStatus::Normal
    }
}

impl VehicleStatus {
    pub const ALL: [VehicleStatus; 3] = [
        VehicleStatus::Normal,
        VehicleStatus::Suspicious,
        VehicleStatus::Stolen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleStatus::Normal => "normal",
            VehicleStatus::Suspicious => "suspicious",
            VehicleStatus::Stolen => "stolen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        VehicleStatus::ALL.iter().copied().find(|st| st.as_str() == s)
    }

    /// Vehicles worth a predicted route on the map.
    pub fn is_flagged(self) -> bool {
        self != VehicleStatus::Normal
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watchlist entry. `is_valid_plate` and `province` are derived client-side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    #[serde(default)]
    pub plate_number: String,
    #[serde(default)]
    pub status: VehicleStatus,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_valid_plate: bool,
    #[serde(default)]
    pub province: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub id: i64,
    #[serde(default)]
    pub plate_number: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed_kmh: f64,
    #[serde(default)]
    pub heading_deg: f64,
    pub timestamp: String,
    #[serde(default)]
    pub vehicle_type: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub is_valid_plate: bool,
}

impl Sighting {
    /// Status of the embedded vehicle, `Normal` when there is none.
    pub fn vehicle_status(&self) -> VehicleStatus {
        self.vehicle
            .as_ref()
            .map(|v| v.status)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    #[serde(default)]
    pub plate_number: String,
    #[serde(default)]
    pub vehicle: Option<i64>,
    #[serde(default)]
    pub status: VehicleStatus,
    pub timestamp: String,
    #[serde(default)]
    pub predicted_latitude: Option<f64>,
    #[serde(default)]
    pub predicted_longitude: Option<f64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub dispatched: bool,
    #[serde(default)]
    pub is_valid_plate: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub vehicles_scanned_24h: u64,
    #[serde(default)]
    pub alerts_triggered_24h: u64,
    #[serde(default)]
    pub total_vehicles_online: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictedRoute {
    #[serde(default)]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub path: Vec<GeoPoint>,
}

/// One fully-replacing poll result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub sightings: Vec<Sighting>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatasetCounts {
    pub vehicles: usize,
    pub sightings: usize,
    pub alerts: usize,
}

impl Dataset {
    pub fn counts(&self) -> DatasetCounts {
        DatasetCounts {
            vehicles: self.vehicles.len(),
            sightings: self.sightings.len(),
            alerts: self.alerts.len(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub plate_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub match_status: bool,
    pub flag_category: VehicleStatus,
    pub confidence: f64,
    pub verification_timestamp: String,
    #[serde(default)]
    pub reference_case_numbers: Vec<String>,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sighting_with_embedded_vehicle() {
        let s: Sighting = serde_json::from_value(json!({
            "id": 4,
            "plate_number": "बा १२ प १२३४",
            "latitude": 27.7,
            "longitude": 85.3,
            "speed_kmh": 42.5,
            "heading_deg": 90.0,
            "timestamp": "2024-01-01T00:00:00Z",
            "vehicle": {"id": 1, "plate_number": "बा १२ प १२३४", "status": "stolen",
                        "owner": "", "last_seen": null}
        }))
        .unwrap();
        assert_eq!(s.vehicle_status(), VehicleStatus::Stolen);
        assert!(!s.is_valid_plate);
    }

    #[test]
    fn sighting_without_vehicle_is_normal() {
        let s: Sighting = serde_json::from_value(json!({
            "id": 4, "plate_number": "x", "latitude": 1.0, "longitude": 2.0,
            "timestamp": "t", "vehicle": null
        }))
        .unwrap();
        assert_eq!(s.vehicle_status(), VehicleStatus::Normal);
        assert_eq!(s.speed_kmh, 0.0);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for st in VehicleStatus::ALL.iter() {
            assert_eq!(VehicleStatus::parse(st.as_str()), Some(*st));
        }
        assert_eq!(VehicleStatus::parse("all"), None);
        assert!(VehicleStatus::Suspicious.is_flagged());
        assert!(!VehicleStatus::Normal.is_flagged());
    }
}
