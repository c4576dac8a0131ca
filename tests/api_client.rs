//! Client tests against an in-process mock of the tracking backend.

use plate_dashboard::api::{ApiClient, RequestOptions};
use plate_dashboard::cancel::cancel_pair;
use plate_dashboard::dataset::{fetch_snapshot, DatasetQuery, DatasetSource};
use plate_dashboard::error::ApiError;
use plate_dashboard::prediction::fetch_routes;
use plate_dashboard::types::{VehicleStatus, VerifyRequest};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;
use warp::Filter;

const PLATE_A: &str = "बा १२ प १२३४";
const PLATE_B: &str = "प्रदेश ३-०१-१२ च १२३४";
const PLATE_C: &str = "को ०५ क ४४४४";

/// Spawns `routes` on an ephemeral port and returns a client pointed at it.
macro_rules! serve {
    ($routes:expr $(,)?) => {{
        let (addr, server): (SocketAddr, _) =
            warp::serve($routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        ApiClient::with_base(&format!("http://{}/api/", addr), Duration::from_secs(5))
    }};
}

fn vehicles_json() -> Value {
    json!([
        {"id": 1, "plate_number": PLATE_A, "status": "stolen", "owner": "Ram", "last_seen": null},
        {"id": 2, "plate_number": PLATE_B, "status": "suspicious", "owner": "Sita", "last_seen": null},
        {"id": 3, "plate_number": PLATE_C, "status": "normal", "owner": "Hari", "last_seen": null}
    ])
}

fn alert_json(acknowledged: bool) -> Value {
    json!({
        "id": 3,
        "plate_number": PLATE_A,
        "vehicle": 1,
        "status": "stolen",
        "timestamp": "2024-05-01T10:00:00Z",
        "predicted_latitude": 27.71,
        "predicted_longitude": 85.32,
        "acknowledged": acknowledged,
        "dispatched": acknowledged
    })
}

fn route_json(lat: f64) -> Value {
    json!({"plate_number": "x", "path": [{"lat": lat, "lon": 85.3}, {"lat": lat + 0.01, "lon": 85.31}]})
}

#[tokio::test]
async fn lists_vehicles() {
    let client = serve!(
        warp::get()
            .and(warp::path!("api" / "vehicles"))
            .map(|| warp::reply::json(&vehicles_json())),
    );
    let vehicles = client.vehicles().await.unwrap();
    assert_eq!(vehicles.len(), 3);
    assert_eq!(vehicles[0].status, VehicleStatus::Stolen);
    assert_eq!(vehicles[1].plate_number, PLATE_B);
}

#[tokio::test]
async fn http_errors_carry_status_and_detail() {
    let client = serve!(
        warp::path!("api" / "stats")
            .map(|| {
                warp::reply::with_status(
                    warp::reply::json(&json!({"detail": "Not found."})),
                    StatusCode::NOT_FOUND,
                )
            })
            .or(warp::path!("api" / "vehicles").map(|| {
                warp::reply::with_status(
                    warp::reply::html("<html>upstream down</html>"),
                    StatusCode::BAD_GATEWAY,
                )
            })),
    );

    match client.stats().await {
        Err(ApiError::Http { status, detail, url, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "Not found.");
            assert!(url.ends_with("/api/stats/"));
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }

    let err = client.vehicles().await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert!(err.to_string().ends_with("502 Bad Gateway"));
}

#[tokio::test]
async fn non_json_success_is_an_empty_body() {
    let client = serve!(warp::path!("api" / "ping").map(|| "pong"));
    assert_eq!(client.get("ping/").await.unwrap(), None);
}

#[tokio::test]
async fn slow_requests_time_out() {
    let client = serve!(warp::path!("api" / "stats").and_then(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok::<_, warp::Rejection>(warp::reply::json(&json!({})))
    }));
    let options = RequestOptions {
        timeout: Some(Duration::from_millis(200)),
        cancel: None,
    };
    match client.request(Method::GET, "/stats/", None, options).await {
        Err(ApiError::Timeout { after, .. }) => assert_eq!(after, Duration::from_secs(1)),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn external_cancel_aborts_request() {
    let client = serve!(warp::path!("api" / "stats").and_then(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok::<_, warp::Rejection>(warp::reply::json(&json!({})))
    }));
    let (canceller, signal) = cancel_pair();
    let options = RequestOptions {
        timeout: None,
        cancel: Some(signal),
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });
    let err = client
        .request(Method::GET, "stats/", None, options)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Cancelled { .. }), "{:?}", err);
}

#[tokio::test]
async fn posts_json_with_content_type() {
    let client = serve!(
        warp::post()
            .and(warp::path!("api" / "verify"))
            .and(warp::header::<String>("content-type"))
            .and(warp::body::json())
            .map(|content_type: String, body: Value| {
                assert_eq!(content_type, "application/json");
                assert_eq!(body["plate_number"], PLATE_A);
                assert!(body.get("make").is_none());
                warp::reply::json(&json!({
                    "match_status": true,
                    "flag_category": "stolen",
                    "confidence": 91.5,
                    "verification_timestamp": "2024-05-01T10:00:00Z",
                    "reference_case_numbers": ["CASE-1"],
                    "response_time_ms": 4
                }))
            }),
    );
    let result = client
        .verify(&VerifyRequest {
            plate_number: PLATE_A.to_string(),
            owner_name: Some("Ram".into()),
            ..VerifyRequest::default()
        })
        .await
        .unwrap();
    assert!(result.match_status);
    assert_eq!(result.flag_category, VehicleStatus::Stolen);
    assert_eq!(result.reference_case_numbers, vec!["CASE-1".to_string()]);
}

#[tokio::test]
async fn acknowledge_falls_back_to_get() {
    let acked = Arc::new(AtomicBool::new(false));
    let posts = Arc::new(AtomicUsize::new(0));

    let post_ack = {
        let posts = posts.clone();
        warp::post()
            .and(warp::path!("api" / "alerts" / i64 / "acknowledge"))
            .map(move |_id: i64| {
                posts.fetch_add(1, Ordering::SeqCst);
                warp::reply::with_status(
                    warp::reply::json(&json!({"detail": "Method \"POST\" not allowed."})),
                    StatusCode::METHOD_NOT_ALLOWED,
                )
            })
    };
    let get_ack = {
        let acked = acked.clone();
        warp::get()
            .and(warp::path!("api" / "alerts" / i64 / "acknowledge"))
            .map(move |_id: i64| {
                acked.store(true, Ordering::SeqCst);
                warp::reply::json(&alert_json(true))
            })
    };
    let dataset = {
        let acked = acked.clone();
        warp::get().and(warp::path!("api" / "dataset")).map(move || {
            warp::reply::json(&json!({
                "vehicles": vehicles_json(),
                "sightings": [],
                "alerts": [alert_json(acked.load(Ordering::SeqCst))],
                "source": "api"
            }))
        })
    };
    let client = serve!(post_ack.or(get_ack).or(dataset));

    let before = fetch_snapshot(&client, DatasetQuery::default()).await.unwrap();
    assert!(!before.alerts[0].acknowledged);

    let alert = client.acknowledge_alert(3).await.unwrap().unwrap();
    assert!(alert.acknowledged);
    assert!(alert.dispatched);
    assert_eq!(posts.load(Ordering::SeqCst), 1);

    let after = fetch_snapshot(&client, DatasetQuery::default()).await.unwrap();
    assert!(after.alerts[0].acknowledged);
}

#[tokio::test]
async fn per_entity_snapshot_passes_windows() {
    let client = serve!(
        warp::path!("api" / "vehicles")
            .map(|| warp::reply::json(&vehicles_json()))
            .or(warp::path!("api" / "sightings" / "recent")
                .and(warp::query::<HashMap<String, String>>())
                .map(|q: HashMap<String, String>| {
                    assert_eq!(q.get("minutes").map(String::as_str), Some("30"));
                    warp::reply::json(&json!([{
                        "id": 11, "plate_number": PLATE_A, "latitude": 27.7, "longitude": 85.3,
                        "speed_kmh": 40.0, "heading_deg": 10.0, "timestamp": "2024-05-01T10:00:00Z",
                        "vehicle": {"id": 1, "plate_number": PLATE_A, "status": "stolen"}
                    }]))
                }))
            .or(warp::path!("api" / "alerts" / "recent")
                .and(warp::query::<HashMap<String, String>>())
                .map(|q: HashMap<String, String>| {
                    assert_eq!(q.get("minutes").map(String::as_str), Some("240"));
                    warp::reply::json(&json!([alert_json(false)]))
                })),
    );
    let query = DatasetQuery {
        source: DatasetSource::PerEntity,
        minutes_sightings: 30,
        minutes_alerts: 240,
    };
    let snapshot = fetch_snapshot(&client, query).await.unwrap();
    let counts = snapshot.counts();
    assert_eq!((counts.vehicles, counts.sightings, counts.alerts), (3, 1, 1));
    assert_eq!(snapshot.sightings[0].vehicle_status(), VehicleStatus::Stolen);
}

#[tokio::test]
async fn combined_snapshot_tolerates_missing_collections() {
    let client = serve!(
        warp::path!("api" / "dataset")
            .and(warp::query::<HashMap<String, String>>())
            .map(|q: HashMap<String, String>| {
                assert_eq!(q.get("minutesSightings").map(String::as_str), Some("60"));
                assert_eq!(q.get("minutesAlerts").map(String::as_str), Some("120"));
                warp::reply::json(&json!({"vehicles": vehicles_json()}))
            }),
    );
    let snapshot = fetch_snapshot(&client, DatasetQuery::default()).await.unwrap();
    assert_eq!(snapshot.vehicles.len(), 3);
    assert!(snapshot.sightings.is_empty());
    assert!(snapshot.alerts.is_empty());
}

#[tokio::test]
async fn route_for_plate_resolves_vehicle_first() {
    let client = serve!(
        warp::path!("api" / "vehicles")
            .map(|| warp::reply::json(&vehicles_json()))
            .or(warp::path!("api" / "vehicles" / i64 / "predicted")
                .map(|id: i64| warp::reply::json(&route_json(id as f64)))),
    );
    let route = client
        .predicted_route_for_plate(&format!("  {}  ", PLATE_B))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(route.path.len(), 2);
    assert_eq!(route.path[0].lat, 2.0);

    assert!(client
        .predicted_route_for_plate("ना ९९ ह ९९९९")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn one_failing_route_does_not_sink_the_others() {
    let client = serve!(
        warp::path!("api" / "vehicles")
            .map(|| warp::reply::json(&vehicles_json()))
            .or(warp::path!("api" / "vehicles" / i64 / "predicted").map(|id: i64| {
                let status = if id == 2 {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                };
                warp::reply::with_status(warp::reply::json(&route_json(id as f64)), status)
            })),
    );
    let routes = fetch_routes(
        &client,
        vec![PLATE_A.to_string(), PLATE_B.to_string(), PLATE_C.to_string()],
    )
    .await;
    assert_eq!(routes.len(), 2);
    assert!(routes.contains_key(PLATE_A));
    assert!(!routes.contains_key(PLATE_B));
    assert!(routes.contains_key(PLATE_C));
}
