//! Radio Browser client against a mock directory.

use airwave_core::error::NetworkError;
use airwave_core::{RadioBrowserCatalog, StationCatalog};
use airwave_proto::config::CatalogConfig;
use airwave_proto::protocol::CatalogQuery;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catalog_for(server: &MockServer) -> RadioBrowserCatalog {
    RadioBrowserCatalog::new(&CatalogConfig {
        base_url: server.uri(),
        ..CatalogConfig::default()
    })
    .unwrap()
}

fn record(id: &str, url: &str, codec: &str, favicon: &str) -> Value {
    json!({
        "stationuuid": id,
        "name": format!("Radio {id}"),
        "url_resolved": url,
        "favicon": favicon,
        "tags": "news,talk",
        "country": "United Kingdom",
        "language": "english",
        "codec": codec,
        "bitrate": 96
    })
}

#[tokio::test]
async fn test_search_by_name_sends_ranked_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/stations/search"))
        .and(query_param("name", "bbc world"))
        .and(query_param("limit", "30"))
        .and(query_param("order", "clickcount"))
        .and(query_param("reverse", "true"))
        .and(query_param("language", "english"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            record("a", "http://bbc.example/a", "MP3", ""),
            record("b", "", "MP3", ""),
            record("c", "https://bbc.example/c", "AAC", "http://img.example/c.png"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let stations = catalog_for(&server)
        .search(&CatalogQuery::Name("bbc world".to_string()))
        .await
        .unwrap();

    let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(stations[0].tags, vec!["news", "talk"]);
    assert_eq!(stations[0].bitrate_kbps, 96);
    assert_eq!(
        stations[1].favicon_url.as_deref(),
        Some("http://img.example/c.png")
    );
}

#[tokio::test]
async fn test_search_encodes_special_characters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/stations/search"))
        .and(query_param("tag", "r&b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let stations = catalog_for(&server)
        .search(&CatalogQuery::Tag("r&b".to_string()))
        .await
        .unwrap();
    assert!(stations.is_empty());
}

#[tokio::test]
async fn test_non_success_status_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/stations/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = catalog_for(&server)
        .search(&CatalogQuery::Name("jazz".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::Status(s) if s.as_u16() == 503));
}

#[tokio::test]
async fn test_null_fields_drop_only_that_station() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/stations/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            record("ok", "http://ok.example/live", "MP3", ""),
            {
                "stationuuid": "nulls",
                "name": null,
                "url_resolved": null,
                "favicon": null,
                "tags": null,
                "codec": null,
                "bitrate": null
            },
            { "name": "no id", "url_resolved": "http://x.example/", "codec": "MP3" },
        ])))
        .mount(&server)
        .await;

    let stations = catalog_for(&server)
        .search(&CatalogQuery::Name("ok".to_string()))
        .await
        .unwrap();
    let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
}

#[tokio::test]
async fn test_malformed_body_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/stations/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = catalog_for(&server)
        .search(&CatalogQuery::Name("jazz".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::Transport(_)));
}

#[tokio::test]
async fn test_top_popular_needs_favicon_and_caps_at_three() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/stations"))
        .and(query_param("limit", "10"))
        .and(query_param("order", "clickcount"))
        .and(query_param("reverse", "true"))
        .and(query_param("language", "english"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            record("p0", "http://pop.example/0", "MP3", "http://img.example/0.png"),
            record("p1", "http://pop.example/1", "MP3", ""),
            record("p2", "http://pop.example/2", "", "http://img.example/2.png"),
            record("p3", "http://pop.example/3", "AAC", "http://img.example/3.png"),
            record("p4", "http://pop.example/4", "MP3", "http://img.example/4.png"),
            record("p5", "http://pop.example/5", "MP3", "http://img.example/5.png"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let popular = catalog_for(&server).top_popular(10, "english").await.unwrap();
    let ids: Vec<&str> = popular.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["p0", "p3", "p4"]);
}
