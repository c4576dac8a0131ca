//! Client-side filtering, sorting and text rendering of a dataset snapshot.

use crate::types::{Alert, GeoPoint, Sighting, Stats, Vehicle, VehicleStatus};
use std::cmp::Ordering;
use std::fmt::Write;

/// Province choices offered by the province filter.
pub const PROVINCE_OPTIONS: [&str; 7] = ["१", "२", "३", "४", "५", "६", "७"];

/// Kathmandu, used when there is nothing to centre the map on.
pub const DEFAULT_MAP_CENTER: GeoPoint = GeoPoint {
    lat: 27.7172,
    lon: 85.3240,
};

pub fn status_color(status: VehicleStatus) -> &'static str {
    match status {
        VehicleStatus::Stolen => "red",
        VehicleStatus::Suspicious => "orange",
        VehicleStatus::Normal => "green",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort<K> {
    pub key: K,
    pub dir: SortDir,
}

impl<K: PartialEq + Copy> Sort<K> {
    pub fn new(key: K, dir: SortDir) -> Self {
        Sort { key, dir }
    }

    /// Clicking a column: ascending, or descending if it was already ascending.
    pub fn toggle(&mut self, key: K) {
        self.dir = if self.key == key && self.dir == SortDir::Asc {
            SortDir::Desc
        } else {
            SortDir::Asc
        };
        self.key = key;
    }

    fn apply(&self, ord: Ordering) -> Ordering {
        match self.dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleColumn {
    Plate,
    Status,
    Owner,
    LastSeen,
    Valid,
    Province,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SightingColumn {
    Plate,
    Timestamp,
    Speed,
    Heading,
    Valid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertColumn {
    Plate,
    Status,
    Timestamp,
    Acknowledged,
}

impl Default for Sort<VehicleColumn> {
    fn default() -> Self {
        Sort::new(VehicleColumn::Plate, SortDir::Asc)
    }
}

impl Default for Sort<SightingColumn> {
    fn default() -> Self {
        Sort::new(SightingColumn::Timestamp, SortDir::Desc)
    }
}

impl Default for Sort<AlertColumn> {
    fn default() -> Self {
        Sort::new(AlertColumn::Timestamp, SortDir::Desc)
    }
}

impl VehicleColumn {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plate" => Some(VehicleColumn::Plate),
            "status" => Some(VehicleColumn::Status),
            "owner" => Some(VehicleColumn::Owner),
            "last_seen" => Some(VehicleColumn::LastSeen),
            "valid" => Some(VehicleColumn::Valid),
            "province" => Some(VehicleColumn::Province),
            _ => None,
        }
    }
}

impl SightingColumn {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plate" => Some(SightingColumn::Plate),
            "timestamp" => Some(SightingColumn::Timestamp),
            "speed" => Some(SightingColumn::Speed),
            "heading" => Some(SightingColumn::Heading),
            "valid" => Some(SightingColumn::Valid),
            _ => None,
        }
    }
}

impl AlertColumn {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plate" => Some(AlertColumn::Plate),
            "status" => Some(AlertColumn::Status),
            "timestamp" => Some(AlertColumn::Timestamp),
            "acknowledged" => Some(AlertColumn::Acknowledged),
            _ => None,
        }
    }
}

/// Sort state of the three tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sorts {
    pub vehicles: Sort<VehicleColumn>,
    pub sightings: Sort<SightingColumn>,
    pub alerts: Sort<AlertColumn>,
}

impl Sorts {
    /// Toggles `column` of `table`, which is one of `vehicles`, `sightings` or `alerts`.
    pub fn toggle(&mut self, table: &str, column: &str) -> Result<(), failure::Error> {
        let unknown = || format_err!("no column {:?} in {}", column, table);
        match table {
            "vehicles" => self.vehicles.toggle(VehicleColumn::parse(column).ok_or_else(unknown)?),
            "sightings" => self
                .sightings
                .toggle(SightingColumn::parse(column).ok_or_else(unknown)?),
            "alerts" => self.alerts.toggle(AlertColumn::parse(column).ok_or_else(unknown)?),
            other => return Err(format_err!("unknown table {:?}", other)),
        }
        Ok(())
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn cmp_opt_str(a: Option<&str>, b: Option<&str>) -> Ordering {
    a.unwrap_or("").cmp(b.unwrap_or(""))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filters {
    /// `None` is "all".
    pub status: Option<VehicleStatus>,
    /// Devanagari province number; `None` is "all".
    pub province: Option<String>,
    pub valid_only: bool,
    pub search: String,
}

impl Filters {
    fn needle(&self) -> String {
        self.search.trim().to_lowercase()
    }

    pub fn vehicles<'a>(&self, vehicles: &'a [Vehicle], sort: Sort<VehicleColumn>) -> Vec<&'a Vehicle> {
        let needle = self.needle();
        let mut list: Vec<&Vehicle> = vehicles
            .iter()
            .filter(|v| self.status.map_or(true, |st| v.status == st))
            .filter(|v| !self.valid_only || v.is_valid_plate)
            .filter(|v| match &self.province {
                Some(p) => v.province.as_deref() == Some(p.as_str()),
                None => true,
            })
            .filter(|v| {
                needle.is_empty()
                    || v.plate_number.to_lowercase().contains(&needle)
                    || v.owner.to_lowercase().contains(&needle)
            })
            .collect();
        list.sort_by(|a, b| {
            let ord = match sort.key {
                VehicleColumn::Plate => a.plate_number.cmp(&b.plate_number),
                VehicleColumn::Status => a.status.as_str().cmp(b.status.as_str()),
                VehicleColumn::Owner => a.owner.cmp(&b.owner),
                VehicleColumn::LastSeen => {
                    cmp_opt_str(a.last_seen.as_deref(), b.last_seen.as_deref())
                }
                VehicleColumn::Valid => a.is_valid_plate.cmp(&b.is_valid_plate),
                VehicleColumn::Province => {
                    cmp_opt_str(a.province.as_deref(), b.province.as_deref())
                }
            };
            sort.apply(ord)
        });
        list
    }

    pub fn sightings<'a>(
        &self,
        sightings: &'a [Sighting],
        sort: Sort<SightingColumn>,
    ) -> Vec<&'a Sighting> {
        let needle = self.needle();
        let mut list: Vec<&Sighting> = sightings
            .iter()
            .filter(|s| !self.valid_only || s.is_valid_plate)
            .filter(|s| needle.is_empty() || s.plate_number.to_lowercase().contains(&needle))
            .collect();
        list.sort_by(|a, b| {
            let ord = match sort.key {
                SightingColumn::Plate => a.plate_number.cmp(&b.plate_number),
                SightingColumn::Timestamp => a.timestamp.cmp(&b.timestamp),
                SightingColumn::Speed => cmp_f64(a.speed_kmh, b.speed_kmh),
                SightingColumn::Heading => cmp_f64(a.heading_deg, b.heading_deg),
                SightingColumn::Valid => a.is_valid_plate.cmp(&b.is_valid_plate),
            };
            sort.apply(ord)
        });
        list
    }

    pub fn alerts<'a>(&self, alerts: &'a [Alert], sort: Sort<AlertColumn>) -> Vec<&'a Alert> {
        let needle = self.needle();
        let mut list: Vec<&Alert> = alerts
            .iter()
            .filter(|a| needle.is_empty() || a.plate_number.to_lowercase().contains(&needle))
            .collect();
        list.sort_by(|a, b| {
            let ord = match sort.key {
                AlertColumn::Plate => a.plate_number.cmp(&b.plate_number),
                AlertColumn::Status => a.status.as_str().cmp(b.status.as_str()),
                AlertColumn::Timestamp => a.timestamp.cmp(&b.timestamp),
                AlertColumn::Acknowledged => a.acknowledged.cmp(&b.acknowledged),
            };
            sort.apply(ord)
        });
        list
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapMarker {
    pub id: i64,
    pub plate_number: String,
    pub position: GeoPoint,
    pub status: VehicleStatus,
    pub color: &'static str,
}

pub fn markers(sightings: &[Sighting]) -> Vec<MapMarker> {
    sightings
        .iter()
        .map(|s| {
            let status = s.vehicle_status();
            MapMarker {
                id: s.id,
                plate_number: s.plate_number.clone(),
                position: GeoPoint {
                    lat: s.latitude,
                    lon: s.longitude,
                },
                status,
                color: status_color(status),
            }
        })
        .collect()
}

/// Centre on the most recent sighting, or Kathmandu.
pub fn map_center(sightings: &[Sighting]) -> GeoPoint {
    sightings
        .first()
        .map(|s| GeoPoint {
            lat: s.latitude,
            lon: s.longitude,
        })
        .unwrap_or(DEFAULT_MAP_CENTER)
}

fn check(b: bool) -> &'static str {
    if b {
        "✓"
    } else {
        "✗"
    }
}

fn or_dash(s: Option<&str>) -> &str {
    match s {
        Some(s) if !s.is_empty() => s,
        _ => "-",
    }
}

/// Left-aligned plain-text table. Widths count chars, not display columns.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let mut out = String::new();
    let mut line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{}{}", c, " ".repeat(w - c.chars().count())))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    };
    line(headers.to_vec());
    for row in rows {
        line(row.iter().map(String::as_str).collect());
    }
    out
}

pub fn render_vehicles(vehicles: &[&Vehicle]) -> String {
    if vehicles.is_empty() {
        return "No vehicles match filters.\n".to_string();
    }
    let rows: Vec<Vec<String>> = vehicles
        .iter()
        .map(|v| {
            vec![
                v.plate_number.clone(),
                v.status.to_string(),
                or_dash(Some(v.owner.as_str())).to_string(),
                or_dash(v.last_seen.as_deref()).to_string(),
                check(v.is_valid_plate).to_string(),
                or_dash(v.province.as_deref()).to_string(),
            ]
        })
        .collect();
    table(
        &["Plate", "Status", "Owner", "Last Seen", "Valid", "Province"],
        &rows,
    )
}

pub fn render_sightings(sightings: &[&Sighting]) -> String {
    if sightings.is_empty() {
        return "No sightings match filters.\n".to_string();
    }
    let rows: Vec<Vec<String>> = sightings
        .iter()
        .map(|s| {
            vec![
                s.plate_number.clone(),
                format!("{:.5}, {:.5}", s.latitude, s.longitude),
                format!("{:.1} km/h", s.speed_kmh),
                format!("{:.0}°", s.heading_deg),
                s.vehicle_status().to_string(),
                s.timestamp.clone(),
                check(s.is_valid_plate).to_string(),
            ]
        })
        .collect();
    table(
        &["Plate", "Position", "Speed", "Heading", "Status", "Time", "Valid"],
        &rows,
    )
}

/// Alert cards, one per alert.
pub fn render_alerts(alerts: &[&Alert]) -> String {
    if alerts.is_empty() {
        return "No alerts yet.\n".to_string();
    }
    let mut out = String::new();
    for a in alerts {
        let predicted = match (a.predicted_latitude, a.predicted_longitude) {
            (Some(lat), Some(lon)) => format!("{:.5}, {:.5}", lat, lon),
            _ => "-".to_string(),
        };
        let action = if a.acknowledged {
            "Dispatched".to_string()
        } else {
            format!("ack with `ack {}`", a.id)
        };
        // Writing to a String cannot fail.
        let _ = writeln!(out, "#{} {} [{}]  {}", a.id, a.plate_number, a.status, action);
        let _ = writeln!(out, "    Predicted: {}", predicted);
        let _ = writeln!(out, "    {}", a.timestamp);
    }
    out
}

pub fn render_stats(stats: &Stats) -> String {
    format!(
        "Vehicles scanned (24h): {}\nAlerts triggered (24h): {}\nVehicles online: {}\n",
        stats.vehicles_scanned_24h, stats.alerts_triggered_24h, stats.total_vehicles_online
    )
}

pub fn render_markers(markers: &[MapMarker]) -> String {
    let mut out = String::new();
    for m in markers {
        let _ = writeln!(
            out,
            "{} at {:.5}, {:.5} - status {} ({})",
            m.plate_number, m.position.lat, m.position.lon, m.status, m.color
        );
    }
    out
}
