//! End to end tests for the HTTP API using a mock OpenWeather server and an
//! in-memory SQLite database.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use citydate::client::OpenWeatherClient;
use citydate::http::{router, RequestContext};
use citydate::store::RecordStore;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GEOCODING_PATH: &str = "/geo/1.0/direct";
const DAY_SUMMARY_PATH: &str = "/data/3.0/onecall/day_summary";

struct TestApp {
    app: Router,
    store: RecordStore,
}

async fn test_app(server: &MockServer) -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    let store = RecordStore::new(pool);
    store.migrate().await.unwrap();

    let geocoding = Url::parse(&format!("{}{}", server.uri(), GEOCODING_PATH)).unwrap();
    let day_summary = Url::parse(&format!("{}{}", server.uri(), DAY_SUMMARY_PATH)).unwrap();
    let client = OpenWeatherClient::new(Client::new(), "test-key", geocoding, day_summary);
    let context = Arc::new(RequestContext::new(client, store.clone(), Registry::default()));

    TestApp {
        app: router(context),
        store,
    }
}

async fn mount_geocode(server: &MockServer, city: &str, lat: f64, lon: f64) {
    Mock::given(method("GET"))
        .and(path(GEOCODING_PATH))
        .and(query_param("q", city))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": city, "lat": lat, "lon": lon, "country": "US"}
        ])))
        .mount(server)
        .await;
}

async fn mount_summary(server: &MockServer, temps: [f64; 6], humidity: f64) {
    let [min, max, morning, afternoon, evening, night] = temps;
    Mock::given(method("GET"))
        .and(path(DAY_SUMMARY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "date": "2024-08-06",
            "units": "metric",
            "temperature": {
                "min": min,
                "max": max,
                "morning": morning,
                "afternoon": afternoon,
                "evening": evening,
                "night": night
            },
            "humidity": {"afternoon": humidity}
        })))
        .mount(server)
        .await;
}

async fn post_city_date(app: &Router, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/data/citydate")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    send(app, req).await
}

async fn get_city_date(app: &Router, query: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(format!("/data/citydate{}", query))
        .body(Body::empty())
        .unwrap();

    send(app, req).await
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, body)
}

#[tokio::test]
async fn test_create_list_and_duplicate() {
    let server = MockServer::start().await;
    mount_geocode(&server, "New York", 40.71, -74.01).await;
    mount_summary(&server, [20.0, 30.0, 22.0, 28.0, 26.0, 24.0], 55.0).await;
    let test = test_app(&server).await;

    let (status, body) = post_city_date(&test.app, json!({"city": "New York", "date": "2024-08-06"})).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(
        json!({
            "city": "New York",
            "date": "2024-08-06",
            "message": "Collected data for New York on 2024-08-06"
        }),
        body
    );

    let (status, body) = get_city_date(&test.app, "?date=2024-08-06").await;
    assert_eq!(StatusCode::OK, status);
    let records = body.as_array().unwrap();
    assert_eq!(1, records.len());
    assert_eq!("New York", records[0]["city"]);
    assert_eq!("2024-08-06", records[0]["date"]);
    assert_eq!(20.0, records[0]["min_temp"].as_f64().unwrap());
    assert_eq!(30.0, records[0]["max_temp"].as_f64().unwrap());
    assert!((records[0]["avg_temp"].as_f64().unwrap() - 25.0).abs() < 1e-9);
    assert_eq!(55.0, records[0]["humidity"].as_f64().unwrap());

    let (status, body) = post_city_date(&test.app, json!({"city": "New York", "date": "2024-08-06"})).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("Record already exists for this city and date", body["detail"]);
}

#[tokio::test]
async fn test_duplicate_does_not_call_provider() {
    let server = MockServer::start().await;
    mount_geocode(&server, "New York", 40.71, -74.01).await;
    mount_summary(&server, [20.0, 30.0, 22.0, 28.0, 26.0, 24.0], 55.0).await;
    let test = test_app(&server).await;

    let (status, _) = post_city_date(&test.app, json!({"city": "New York", "date": "2024-08-06"})).await;
    assert_eq!(StatusCode::OK, status);
    let calls = server.received_requests().await.unwrap().len();

    let (status, _) = post_city_date(&test.app, json!({"city": "New York", "date": "2024-08-06"})).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(calls, server.received_requests().await.unwrap().len());
}

#[tokio::test]
async fn test_list_returns_each_record_for_date() {
    let server = MockServer::start().await;
    mount_geocode(&server, "New York", 40.71, -74.01).await;
    mount_geocode(&server, "Boston", 42.36, -71.06).await;
    mount_geocode(&server, "Chicago", 41.88, -87.63).await;
    mount_summary(&server, [10.0, 18.0, 12.0, 17.0, 15.0, 11.0], 70.0).await;
    let test = test_app(&server).await;

    for (city, date) in [
        ("New York", "2024-08-06"),
        ("Boston", "2024-08-06"),
        ("Chicago", "2024-08-07"),
    ] {
        let (status, _) = post_city_date(&test.app, json!({"city": city, "date": date})).await;
        assert_eq!(StatusCode::OK, status);
    }

    let (status, body) = get_city_date(&test.app, "?date=2024-08-06").await;
    assert_eq!(StatusCode::OK, status);
    let records = body.as_array().unwrap();
    assert_eq!(2, records.len());
    assert!(records.iter().all(|r| r["date"] == "2024-08-06"));
    assert_eq!("New York", records[0]["city"]);
    assert_eq!("Boston", records[1]["city"]);
    assert!((records[1]["avg_temp"].as_f64().unwrap() - 13.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_list_no_records() {
    let server = MockServer::start().await;
    let test = test_app(&server).await;

    let (status, body) = get_city_date(&test.app, "?date=2024-08-06").await;

    assert_eq!(StatusCode::NOT_FOUND, status);
    assert_eq!("No records found for the date 2024-08-06", body["detail"]);
}

#[tokio::test]
async fn test_list_malformed_date() {
    let server = MockServer::start().await;
    let test = test_app(&server).await;

    for query in ["?date=2024-8-6", "?date=2024-02-30", "?date=yesterday", "?date=", ""] {
        let (status, body) = get_city_date(&test.app, query).await;
        assert_eq!(StatusCode::BAD_REQUEST, status, "{}", query);
        assert_eq!("Date must be in yyyy-mm-dd format", body["detail"], "{}", query);
    }
}

#[tokio::test]
async fn test_create_malformed_date() {
    let server = MockServer::start().await;
    let test = test_app(&server).await;

    for date in ["2024/08/06", "2024-13-01", "2023-02-29", "08-06-2024"] {
        let (status, body) = post_city_date(&test.app, json!({"city": "New York", "date": date})).await;
        assert_eq!(StatusCode::BAD_REQUEST, status, "{}", date);
        assert_eq!("Date must be in yyyy-mm-dd format", body["detail"], "{}", date);
    }

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_empty_city() {
    let server = MockServer::start().await;
    let test = test_app(&server).await;

    let (status, body) = post_city_date(&test.app, json!({"city": "", "date": "2024-08-06"})).await;

    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("City name must be provided", body["detail"]);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_malformed_body() {
    let server = MockServer::start().await;
    let test = test_app(&server).await;

    let (status, _) = post_city_date(&test.app, json!({"city": "New York"})).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    let req = Request::builder()
        .method("POST")
        .uri("/data/citydate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&test.app, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
}

#[tokio::test]
async fn test_create_unknown_city() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GEOCODING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let test = test_app(&server).await;

    let (status, body) = post_city_date(&test.app, json!({"city": "Atlantis", "date": "2024-08-06"})).await;

    assert_eq!(StatusCode::NOT_FOUND, status);
    assert_eq!("No data found for city Atlantis", body["detail"]);
}

#[tokio::test]
async fn test_create_geocoding_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GEOCODING_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let test = test_app(&server).await;

    let (status, body) = post_city_date(&test.app, json!({"city": "New York", "date": "2024-08-06"})).await;

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    assert_eq!("Error fetching city coordinates", body["detail"]);
}

#[tokio::test]
async fn test_create_weather_failure_writes_nothing() {
    let server = MockServer::start().await;
    mount_geocode(&server, "New York", 40.71, -74.01).await;
    Mock::given(method("GET"))
        .and(path(DAY_SUMMARY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let test = test_app(&server).await;

    let (status, body) = post_city_date(&test.app, json!({"city": "New York", "date": "2024-08-06"})).await;

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    assert_eq!("Error fetching weather data", body["detail"]);

    let date = chrono::NaiveDate::from_ymd_opt(2024, 8, 6).unwrap();
    assert!(test.store.find_by_date(date).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = MockServer::start().await;
    mount_geocode(&server, "New York", 40.71, -74.01).await;
    mount_summary(&server, [20.0, 30.0, 22.0, 28.0, 26.0, 24.0], 55.0).await;
    let test = test_app(&server).await;

    let (status, _) = post_city_date(&test.app, json!({"city": "New York", "date": "2024-08-06"})).await;
    assert_eq!(StatusCode::OK, status);

    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let res = test.app.clone().oneshot(req).await.unwrap();
    assert_eq!(StatusCode::OK, res.status());

    let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("citydate_records_created_total 1"), "{}", text);
}
