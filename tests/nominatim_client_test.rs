use green_geo_etl::core::geocoder::Geocoder;
use green_geo_etl::domain::model::{Coordinates, GeocodeOutcome, LookupFailure, Record, Table};
use green_geo_etl::domain::ports::{AddressLookup, GeocoderSettings};
use green_geo_etl::NominatimClient;
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn client(server: &MockServer) -> NominatimClient {
    NominatimClient::new(&server.url("/search"), "geo_app", None).unwrap()
}

#[tokio::test]
async fn test_lookup_sends_search_query_and_parses_first_hit() {
    let server = MockServer::start_async().await;
    let api_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/search")
                .query_param("q", "A1, Bornova, Izmir")
                .query_param("format", "json")
                .query_param("limit", "1")
                .header("user-agent", "geo_app");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"place_id": 10, "lat": "38.46", "lon": "27.21", "display_name": "Bornova"}
                ]));
        })
        .await;

    let result = client(&server).lookup("A1, Bornova, Izmir").await;

    api_mock.assert_async().await;
    assert_eq!(result, Ok(Some(Coordinates { lat: 38.46, lon: 27.21 })));
}

#[tokio::test]
async fn test_extra_params_are_forwarded() {
    let server = MockServer::start_async().await;
    let api_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/search")
                .query_param("q", "Konak")
                .query_param("countrycodes", "tr");
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;

    let client = client(&server).with_params(vec![("countrycodes".to_string(), "tr".to_string())]);
    let result = assert_ok!(client.lookup("Konak").await);

    api_mock.assert_async().await;
    assert_eq!(result, None);
}

#[tokio::test]
async fn test_http_failures_are_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param("q", "busy");
            then.status(429);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param("q", "broken");
            then.status(500);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param("q", "html");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let client = client(&server);
    assert_eq!(client.lookup("busy").await, Err(LookupFailure::RateLimited));
    assert_eq!(client.lookup("broken").await, Err(LookupFailure::HttpStatus(500)));
    assert!(matches!(
        assert_err!(client.lookup("html").await),
        LookupFailure::MalformedResponse(_)
    ));
}

#[tokio::test]
async fn test_timeout_and_unreachable_service() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(serde_json::json!([]));
        })
        .await;

    let slow = NominatimClient::new(
        &server.url("/search"),
        "geo_app",
        Some(Duration::from_millis(50)),
    )
    .unwrap();
    assert_eq!(slow.lookup("Konak").await, Err(LookupFailure::Timeout));

    let unreachable = NominatimClient::new("http://127.0.0.1:1/search", "geo_app", None).unwrap();
    assert_eq!(unreachable.lookup("Konak").await, Err(LookupFailure::Network));
}

#[tokio::test]
async fn test_geocoder_over_http_keeps_every_row() {
    let server = MockServer::start_async().await;
    let hit = server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param("q", "A1, Bornova, Izmir");
            then.status(200)
                .json_body(serde_json::json!([{"lat": "38.46", "lon": "27.21"}]));
        })
        .await;
    let miss = server
        .mock_async(|when, then| {
            when.method(GET).path("/search").query_param("q", "unresolvable string");
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;

    let mut table = Table::new(vec!["ADRES".to_string()]);
    for address in ["A1, Bornova, Izmir", "unresolvable string", "A1, Bornova, Izmir"] {
        let mut record = Record::default();
        record
            .data
            .insert("ADRES".to_string(), serde_json::json!(address));
        table.records.push(record);
    }

    let geocoder = Geocoder::new(Arc::new(client(&server)));
    assert!(matches!(
        geocoder.resolve("unresolvable string").await,
        GeocodeOutcome::NotFound
    ));

    let (table, stats) = geocoder
        .geocode_table("north", table, &GeocoderSettings::default())
        .await
        .unwrap();

    hit.assert_hits_async(2).await;
    miss.assert_hits_async(2).await;
    assert_eq!(table.len(), 3);
    assert_eq!(stats.resolved, 2);
    assert_eq!(table.records[0].get_f64("latitude"), Some(38.46));
    assert_eq!(table.records[0].get_f64("longitude"), Some(27.21));
    assert!(table.records[1].data["latitude"].is_null());
    assert!(table.records[1].data["longitude"].is_null());
}
