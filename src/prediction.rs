//! Predicted routes for flagged vehicles on the map.

use crate::api::ApiClient;
use crate::types::{GeoPoint, Sighting};
use futures::future::join_all;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

pub type RouteMap = BTreeMap<String, Vec<GeoPoint>>;

/// Distinct plates whose sighting embeds a suspicious or stolen vehicle.
pub fn plates_of_interest(sightings: &[Sighting]) -> BTreeSet<String> {
    sightings
        .iter()
        .filter(|s| s.vehicle_status().is_flagged())
        .map(|s| s.plate_number.clone())
        .collect()
}

/// Fetches one route per plate concurrently and returns the ones that resolved.
///
/// A failing or empty fetch only drops that plate; the others are still merged.
pub async fn fetch_routes<I>(client: &ApiClient, plates: I) -> RouteMap
where
    I: IntoIterator<Item = String>,
{
    let fetches = plates.into_iter().map(|plate| async move {
        let result = client.predicted_route_for_plate(&plate).await;
        (plate, result)
    });

    let mut routes = RouteMap::new();
    for (plate, result) in join_all(fetches).await {
        match result {
            Ok(Some(route)) if !route.path.is_empty() => {
                routes.insert(plate, route.path);
            }
            Ok(_) => debug!("No predicted route for {}", plate),
            Err(e) => warn!("Predicted route for {} failed: {}", plate, e),
        }
    }
    routes
}

/// Routes accumulated over a map session. New results overwrite per plate; plates
/// missing from a later fetch keep their last known route.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteCache {
    routes: RouteMap,
}

impl RouteCache {
    pub fn new() -> Self {
        RouteCache::default()
    }

    /// Returns true if anything changed.
    pub fn merge(&mut self, next: RouteMap) -> bool {
        let mut changed = false;
        for (plate, path) in next {
            if self.routes.get(&plate) != Some(&path) {
                self.routes.insert(plate, path);
                changed = true;
            }
        }
        changed
    }

    pub fn get(&self, plate: &str) -> Option<&[GeoPoint]> {
        self.routes.get(plate).map(Vec::as_slice)
    }

    pub fn routes(&self) -> &RouteMap {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Fetches routes for the flagged plates in `sightings` and merges them in.
    pub async fn refresh(&mut self, client: &ApiClient, sightings: &[Sighting]) -> bool {
        let plates = plates_of_interest(sightings);
        if plates.is_empty() {
            return false;
        }
        let next = fetch_routes(client, plates).await;
        self.merge(next)
    }
}
