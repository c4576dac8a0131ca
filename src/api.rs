//! HTTP client for the vehicle-tracking backend.

use crate::cancel::CancelSignal;
use crate::config::{clamp_timeout, Config};
use crate::error::ApiError;
use crate::plate;
use crate::types::{
    Alert, Dataset, PredictedRoute, Sighting, Stats, Vehicle, VerifyRequest, VerifyResult,
};
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Overrides the client's timeout; clamped to at least one second.
    pub timeout: Option<Duration>,
    /// External cancellation, in addition to the timeout.
    pub cancel: Option<CancelSignal>,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        ApiClient::with_base(&config.api_base, config.timeout)
    }

    pub fn with_base(base: &str, timeout: Duration) -> Self {
        ApiClient {
            http: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            timeout: clamp_timeout(timeout),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with('/') {
            format!("{}{}", self.base, path)
        } else {
            format!("{}/{}", self.base, path)
        }
    }

    /// Issues one request and returns the parsed JSON body, if there was one.
    ///
    /// A body that is not JSON comes back as `None` rather than an error. A string
    /// `body` is sent verbatim; anything else is serialized to JSON text.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<Option<Value>, ApiError> {
        let url = self.url(path);
        let timeout = options.timeout.map(clamp_timeout).unwrap_or(self.timeout);
        debug!("{} {}", method, url);

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");
        if method != Method::GET {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(body) = body {
            builder = builder.body(match body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }

        let network = |e: reqwest::Error| ApiError::Network {
            method: method.to_string(),
            url: url.clone(),
            message: e.to_string(),
        };
        let exchange = async {
            let res = builder.send().await.map_err(network)?;
            let status = res.status();
            let text = res.text().await.map_err(network)?;
            Ok::<_, ApiError>((status, text))
        };

        // The timer lives inside this future, so every exit path drops it.
        let timed = tokio::time::timeout(timeout, exchange);
        let outcome = match options.cancel {
            Some(mut signal) => {
                tokio::select! {
                    r = timed => r,
                    _ = signal.cancelled() => {
                        return Err(ApiError::Cancelled {
                            method: method.to_string(),
                            url: url.clone(),
                        });
                    }
                }
            }
            None => timed.await,
        };
        let (status, text) = match outcome {
            Ok(r) => r?,
            Err(_) => {
                return Err(ApiError::Timeout {
                    method: method.to_string(),
                    url,
                    after: timeout,
                })
            }
        };

        let json = parse_body(&text);
        if !status.is_success() {
            return Err(ApiError::Http {
                method: method.to_string(),
                url,
                status: status.as_u16(),
                detail: error_detail(json.as_ref(), status),
            });
        }
        Ok(json)
    }

    pub async fn get(&self, path: &str) -> Result<Option<Value>, ApiError> {
        self.request(Method::GET, path, None, RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Option<Value>, ApiError> {
        self.request(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    pub async fn vehicles(&self) -> Result<Vec<Vehicle>, ApiError> {
        let path = "/vehicles/";
        let body = self.get(path).await?;
        self.decode_or_default(Method::GET, path, body)
    }

    pub async fn recent_sightings(&self, minutes: u32) -> Result<Vec<Sighting>, ApiError> {
        let path = format!("/sightings/recent/?minutes={}", minutes);
        let body = self.get(&path).await?;
        self.decode_or_default(Method::GET, &path, body)
    }

    pub async fn recent_alerts(&self, minutes: u32) -> Result<Vec<Alert>, ApiError> {
        let path = format!("/alerts/recent/?minutes={}", minutes);
        let body = self.get(&path).await?;
        self.decode_or_default(Method::GET, &path, body)
    }

    pub async fn stats(&self) -> Result<Stats, ApiError> {
        let path = "/stats/";
        let body = self.get(path).await?;
        self.decode(Method::GET, path, body)
    }

    /// All three collections from the combined endpoint. Missing collections are empty.
    pub async fn dataset(
        &self,
        minutes_sightings: u32,
        minutes_alerts: u32,
    ) -> Result<Dataset, ApiError> {
        let path = format!(
            "/dataset/?minutesSightings={}&minutesAlerts={}",
            minutes_sightings, minutes_alerts
        );
        let body = self.get(&path).await?;
        self.decode_or_default(Method::GET, &path, body)
    }

    /// Marks an alert acknowledged and dispatched.
    ///
    /// Some backend deployments only route `GET` for this action, so a rejected
    /// `POST` is retried once as a `GET` of the same path. This is a compatibility
    /// shim, not a pattern to copy for other writes.
    pub async fn acknowledge_alert(&self, id: i64) -> Result<Option<Alert>, ApiError> {
        let path = format!("/alerts/{}/acknowledge/", id);
        let (method, body) = match self.post(&path, &json!({})).await {
            Ok(body) => (Method::POST, body),
            Err(e @ ApiError::Cancelled { .. }) => return Err(e),
            Err(e) => {
                warn!("Acknowledge via POST failed ({}); retrying with GET", e);
                (Method::GET, self.get(&path).await?)
            }
        };
        match body {
            Some(body) => self.decode(method, &path, Some(body)).map(Some),
            None => Ok(None),
        }
    }

    pub async fn predicted_route(&self, vehicle_id: i64) -> Result<PredictedRoute, ApiError> {
        let path = format!("/vehicles/{}/predicted/", vehicle_id);
        let body = self.get(&path).await?;
        self.decode_or_default(Method::GET, &path, body)
    }

    /// Looks the plate up in the vehicle list and fetches that vehicle's route.
    /// `None` when no vehicle carries the plate.
    pub async fn predicted_route_for_plate(
        &self,
        plate_number: &str,
    ) -> Result<Option<PredictedRoute>, ApiError> {
        let wanted = plate_key(plate_number);
        let vehicles = self.vehicles().await?;
        let vehicle = match vehicles.iter().find(|v| plate_key(&v.plate_number) == wanted) {
            Some(v) => v,
            None => {
                debug!("No vehicle with plate {}", plate_number);
                return Ok(None);
            }
        };
        self.predicted_route(vehicle.id).await.map(Some)
    }

    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResult, ApiError> {
        let path = "/verify/";
        let payload = serde_json::to_value(request).map_err(|e| ApiError::Decode {
            method: Method::POST.to_string(),
            url: self.url(path),
            message: e.to_string(),
        })?;
        let body = self.post(path, &payload).await?;
        self.decode(Method::POST, path, body)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let decode_error = |message: String| ApiError::Decode {
            method: method.to_string(),
            url: self.url(path),
            message,
        };
        let body = body.ok_or_else(|| decode_error("expected a JSON body".to_string()))?;
        serde_json::from_value(body).map_err(|e| decode_error(e.to_string()))
    }

    fn decode_or_default<T: DeserializeOwned + Default>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        match body {
            None | Some(Value::Null) => Ok(T::default()),
            body => self.decode(method, path, body),
        }
    }
}

fn plate_key(plate_number: &str) -> String {
    plate::normalize(plate_number).to_uppercase()
}

fn parse_body(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

fn error_detail(body: Option<&Value>, status: StatusCode) -> String {
    let field = |name: &str| match body.and_then(|b| b.get(name)) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Some(Value::Bool(true)) => Some("true".to_string()),
        Some(v @ Value::Array(_)) | Some(v @ Value::Object(_)) => Some(v.to_string()),
        _ => None,
    };
    field("detail")
        .or_else(|| field("error"))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}
