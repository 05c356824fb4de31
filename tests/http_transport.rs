mod common;
use common::FakeUpstream;

use base64::Engine;
use buildot::app::App;
use buildot::config::Settings;
use buildot::errors::AdapterError;
use serde_json::{json, Map, Value};
use std::time::Duration;

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn settings_for(data: &FakeUpstream, ems: &FakeUpstream) -> Settings {
    let mut settings = Settings::default()
        .with_data_api_base(Some(data.base.clone()))
        .with_ems_api_base(Some(ems.base.clone()));
    settings.log_level = buildot::services::logger::LogLevel::Error;
    settings
}

async fn app_against(data: &FakeUpstream, ems: &FakeUpstream) -> App {
    App::initialize(settings_for(data, ems)).expect("app")
}

#[tokio::test]
async fn data_post_sends_json_body_and_bearer() {
    let data = FakeUpstream::start(200, "application/json", br#"{"items":[1,2]}"#).await;
    let ems = FakeUpstream::start(200, "application/json", b"{}").await;
    let app = app_against(&data, &ems).await;

    let out = app
        .dispatcher
        .invoke(
            "get_buildings",
            &args(json!({"siteId": 4, "search": null})),
            None,
            Some("data-token"),
        )
        .await
        .expect("success");
    assert_eq!(out, json!({"items": [1, 2]}));

    let seen = data.only_request();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.path(), "/api/Application/GetAllBuildings");
    assert_eq!(seen.header("authorization"), Some("Bearer data-token"));
    assert!(seen
        .header("content-type")
        .map_or(false, |ct| ct.starts_with("application/json")));
    assert!(seen.header("referer").is_none());
    let body: Value = serde_json::from_slice(&seen.body).expect("json body");
    assert_eq!(body, json!({"pageNo": 1, "pageSize": 20, "siteId": 4}));
    assert!(ems.requests().is_empty());
    assert_eq!(app.dispatcher.active_clients(), 0);
}

#[tokio::test]
async fn ems_get_uses_wire_names_and_referer() {
    let data = FakeUpstream::start(200, "application/json", b"{}").await;
    let ems = FakeUpstream::start(200, "application/json", b"[]").await;
    let app = app_against(&data, &ems).await;

    let out = app
        .dispatcher
        .invoke(
            "ems_get_meter_readings",
            &args(json!({"meterId": 901})),
            None,
            Some("ems-token"),
        )
        .await
        .expect("success");
    assert_eq!(out, json!([]));

    let seen = ems.only_request();
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.path(), "/Meter/GetMeterReadings");
    assert_eq!(seen.query(), "meterid=901");
    assert_eq!(
        seen.header("referer"),
        Some("https://energy.machinesensiot.com/")
    );
    assert_eq!(seen.header("authorization"), Some("Bearer ems-token"));
    assert!(seen.body.is_empty());
}

#[tokio::test]
async fn empty_json_post_sends_braces_with_query() {
    let data = FakeUpstream::start(200, "application/json", b"{}").await;
    let ems = FakeUpstream::start(200, "application/json", b"{}").await;
    let app = app_against(&data, &ems).await;

    app.dispatcher
        .invoke(
            "get_unit_price_by_location",
            &args(json!({"locationId": 8, "utilityType": 2})),
            None,
            Some("tok"),
        )
        .await
        .expect("success");

    let seen = data.only_request();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.query(), "locationId=8&utilityType=2");
    assert_eq!(seen.body, b"{}".to_vec());
}

#[tokio::test]
async fn form_post_is_url_encoded() {
    let data = FakeUpstream::start(200, "application/json", b"{}").await;
    let ems = FakeUpstream::start(200, "application/json", br#"{"acknowledged":true}"#).await;
    let app = app_against(&data, &ems).await;

    app.dispatcher
        .invoke(
            "ems_acknowledge_fault",
            &args(json!({"faultId": 5, "comment": "on site"})),
            None,
            Some("tok"),
        )
        .await
        .expect("success");

    let seen = ems.only_request();
    assert_eq!(seen.method, "POST");
    assert_eq!(
        seen.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    let mut pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(&seen.body).expect("form body");
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("comment".to_string(), "on site".to_string()),
            ("faultId".to_string(), "5".to_string()),
        ]
    );
}

#[tokio::test]
async fn binary_response_round_trips() {
    let png: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
    let data = FakeUpstream::start(200, "image/png", png).await;
    let ems = FakeUpstream::start(200, "application/json", b"{}").await;
    let app = app_against(&data, &ems).await;

    let out = app
        .dispatcher
        .invoke("get_icon_image", &args(json!({"key": "ahu"})), None, Some("tok"))
        .await
        .expect("success");
    assert_eq!(out["content_type"], "image/png");
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(out["base64"].as_str().expect("base64"))
        .expect("decode");
    assert_eq!(decoded, png.to_vec());
    assert_eq!(data.only_request().query(), "key=ahu");
}

#[tokio::test]
async fn not_found_is_an_upstream_error_with_body() {
    let data = FakeUpstream::start(404, "text/plain", b"route not found").await;
    let ems = FakeUpstream::start(200, "application/json", b"{}").await;
    let app = app_against(&data, &ems).await;

    let err = app
        .dispatcher
        .invoke("get_sites", &Map::new(), None, Some("tok"))
        .await
        .expect_err("404");
    match err {
        AdapterError::Upstream { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "route not found");
        }
        other => panic!("expected Upstream, got {:?}", other),
    }
    assert_eq!(app.dispatcher.active_clients(), 0);
}

#[tokio::test]
async fn slow_upstream_times_out_as_transport_error() {
    let data = FakeUpstream::start_with_delay(
        200,
        "application/json",
        b"{}",
        Duration::from_secs(5),
    )
    .await;
    let ems = FakeUpstream::start(200, "application/json", b"{}").await;
    let mut settings = settings_for(&data, &ems);
    settings.request_timeout_ms = 300;
    settings.connect_timeout_ms = 100;
    let app = App::initialize(settings).expect("app");

    let err = app
        .dispatcher
        .invoke("get_sites", &Map::new(), None, Some("tok"))
        .await
        .expect_err("timeout");
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert_eq!(app.dispatcher.active_clients(), 0);
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let closed = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let settings = Settings::default()
        .with_data_api_base(Some(closed))
        .with_log_level(Some(buildot::services::logger::LogLevel::Error));
    let app = App::initialize(settings).expect("app");
    let err = app
        .dispatcher
        .invoke("get_sites", &Map::new(), None, Some("tok"))
        .await
        .expect_err("refused");
    assert_eq!(err.code(), "TRANSPORT_ERROR");
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn redirects_are_not_followed() {
    let data = FakeUpstream::start_redirect("/moved").await;
    let ems = FakeUpstream::start(200, "application/json", b"{}").await;
    let app = app_against(&data, &ems).await;

    let err = app
        .dispatcher
        .invoke("get_sites", &Map::new(), None, Some("tok"))
        .await
        .expect_err("302 is not success");
    match err {
        AdapterError::Upstream { status, body } => {
            assert_eq!(status, 302);
            assert_eq!(body, "moved");
        }
        other => panic!("expected Upstream, got {:?}", other),
    }
    let seen = data.only_request();
    assert_eq!(seen.path(), "/api/Application/GetAllSites");
    assert_eq!(app.dispatcher.active_clients(), 0);
}
