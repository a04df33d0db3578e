use std::sync::Arc;
use aerodex::server::{routes, SharedCatalog};
use aerodex::store::AirportStore;
use aerodex::{AirportCatalog, CatalogConfig};
use serde_json::{json, Value};
use warp::http::StatusCode;

fn shared() -> SharedCatalog {
    Arc::new(AirportCatalog::new(AirportStore::in_memory(), CatalogConfig::default()))
}

fn body(resp: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
    serde_json::from_slice(resp.body()).unwrap()
}

fn jfk() -> Value {
    json!({
        "iata_code": "JFK",
        "icao_code": "KJFK",
        "name": "John F Kennedy Intl",
        "city": "New York, United States",
        "location": { "type": "Point", "coordinates": [-73.7, 40.6] },
        "alt": 13,
        "tz": "America/New_York"
    })
}

#[tokio::test]
async fn create_then_read() {
    let api = routes(shared());

    let resp = warp::test::request().method("POST").path("/airports").json(&jfk()).reply(&api).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body(&resp);
    assert_eq!(created["status"], "created");
    assert_eq!(created["identifier"], "JFK");
    assert!(created["id"].as_str().is_some());

    let resp = warp::test::request().path("/airports/KJFK").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let airport = body(&resp);
    assert_eq!(airport["name"], "John F Kennedy Intl");
    assert_eq!(airport["country"], "United States");
    assert_eq!(airport["alt"], 13.0);

    let resp = warp::test::request().path("/airports").reply(&api).await;
    let all = body(&resp);
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["identifier"], "JFK");
}

#[tokio::test]
async fn create_without_codes_is_bad_request() {
    let api = routes(shared());
    let mut input = jfk();
    input["iata_code"] = Value::Null;
    input["icao_code"] = json!("");

    let resp = warp::test::request().method("POST").path("/airports").json(&input).reply(&api).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body(&resp)["error"].as_str().unwrap().contains("required"));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let api = routes(shared());
    let resp = warp::test::request()
    .method("POST")
    .path("/airports")
    .header("content-type", "application/json")
    .body("{not json")
    .reply(&api)
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body(&resp)["error"].is_string());
}

#[tokio::test]
async fn nearby_and_popular() {
    let api = routes(shared());
    warp::test::request().method("POST").path("/airports").json(&jfk()).reply(&api).await;

    let resp = warp::test::request().path("/airports/nearby?lat=40.6&lng=-73.7&radius=1").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let hits = body(&resp);
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["identifier"], "JFK");
    assert!(hits[0]["distance_km"].as_f64().unwrap() < 0.001);
    assert!(hits[0]["ref"].is_string());
    assert_eq!(hits[0]["airport"]["icao_code"], "KJFK");

    for _ in 0..5 {
        warp::test::request().path("/airports/JFK").reply(&api).await;
    }
    let resp = warp::test::request().path("/airports/popular?limit=1").reply(&api).await;
    let top = body(&resp);
    assert_eq!(top.as_array().unwrap().len(), 1);
    assert_eq!(top[0]["identifier"], "JFK");
    assert_eq!(top[0]["visits"], 5);
}

#[tokio::test]
async fn nearby_validates_query() {
    let api = routes(shared());
    for path in [
        "/airports/nearby",
        "/airports/nearby?lat=40.6",
        "/airports/nearby?lat=abc&lng=1",
        "/airports/nearby?lat=1&lng=1&radius=-5",
        "/airports/nearby?lat=1&lng=190",
    ] {
        let resp = warp::test::request().path(path).reply(&api).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", path);
    }
}

#[tokio::test]
async fn update_and_delete() {
    let api = routes(shared());
    warp::test::request().method("POST").path("/airports").json(&jfk()).reply(&api).await;

    let patch = json!({ "name": "Idlewild" });
    let resp = warp::test::request().method("PUT").path("/airports/JFK").json(&patch).reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body(&resp), json!({ "status": "updated" }));

    let resp = warp::test::request().method("PUT").path("/airports/JFK").json(&patch).reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(&resp)["error"], "Airport not found or no changes made");

    let resp = warp::test::request().method("DELETE").path("/airports/JFK").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body(&resp), json!({ "status": "deleted" }));

    let resp = warp::test::request().path("/airports/JFK").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(&resp)["error"], "Airport not found");

    let resp = warp::test::request().method("DELETE").path("/airports/JFK").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_with_blank_name_is_bad_request() {
    let api = routes(shared());
    warp::test::request().method("POST").path("/airports").json(&jfk()).reply(&api).await;

    let patch = json!({ "name": "   " });
    let resp = warp::test::request().method("PUT").path("/airports/JFK").json(&patch).reply(&api).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body(&resp)["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let api = routes(shared());
    let resp = warp::test::request().path("/runways").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_preflight_is_allowed() {
    let api = routes(shared());
    let resp = warp::test::request()
    .method("OPTIONS")
    .path("/airports")
    .header("origin", "http://localhost:8080")
    .header("access-control-request-method", "POST")
    .header("access-control-request-headers", "content-type")
    .reply(&api)
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("access-control-allow-origin"));
}
