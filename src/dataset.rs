use crate::api::ApiClient;
use crate::error::ApiError;
use crate::plate;
use crate::types::Dataset;
use futures::future::{self, BoxFuture, FutureExt};
use log::debug;

/// How a snapshot is assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetSource {
    /// One call to the combined `/dataset/` endpoint.
    Combined,
    /// Three concurrent calls: vehicles, recent sightings, recent alerts.
    PerEntity,
}

impl DatasetSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "api" => Some(DatasetSource::Combined),
            "apiLegacy" => Some(DatasetSource::PerEntity),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetSource::Combined => "api",
            DatasetSource::PerEntity => "apiLegacy",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatasetQuery {
    pub source: DatasetSource,
    pub minutes_sightings: u32,
    pub minutes_alerts: u32,
}

impl Default for DatasetQuery {
    fn default() -> Self {
        DatasetQuery {
            source: DatasetSource::Combined,
            minutes_sightings: 60,
            minutes_alerts: 120,
        }
    }
}

/// Something that can produce a raw snapshot. The poller only talks to this.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self, query: DatasetQuery) -> BoxFuture<'static, Result<Dataset, ApiError>>;
}

impl SnapshotSource for ApiClient {
    fn fetch(&self, query: DatasetQuery) -> BoxFuture<'static, Result<Dataset, ApiError>> {
        let client = self.clone();
        async move { fetch_snapshot(&client, query).await }.boxed()
    }
}

/// Fetches the three collections as they are right now.
pub async fn fetch_snapshot(client: &ApiClient, query: DatasetQuery) -> Result<Dataset, ApiError> {
    let dataset = match query.source {
        DatasetSource::Combined => {
            client
                .dataset(query.minutes_sightings, query.minutes_alerts)
                .await?
        }
        DatasetSource::PerEntity => {
            let (vehicles, sightings, alerts) = future::try_join3(
                client.vehicles(),
                client.recent_sightings(query.minutes_sightings),
                client.recent_alerts(query.minutes_alerts),
            )
            .await?;
            Dataset {
                vehicles,
                sightings,
                alerts,
            }
        }
    };
    debug!(
        "Fetched dataset via {}: {:?}",
        query.source.as_str(),
        dataset.counts()
    );
    Ok(dataset)
}

/// Normalises every plate and fills in the derived validity and province fields.
pub fn annotate(mut dataset: Dataset) -> Dataset {
    for v in dataset.vehicles.iter_mut() {
        v.is_valid_plate = plate::is_valid(&v.plate_number);
        v.province = plate::extract_province(&v.plate_number);
        v.plate_number = plate::normalize(&v.plate_number);
    }
    for s in dataset.sightings.iter_mut() {
        s.is_valid_plate = plate::is_valid(&s.plate_number);
        s.plate_number = plate::normalize(&s.plate_number);
    }
    for a in dataset.alerts.iter_mut() {
        a.is_valid_plate = plate::is_valid(&a.plate_number);
        a.plate_number = plate::normalize(&a.plate_number);
    }
    dataset
}
