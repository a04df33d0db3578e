use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::error::{CatalogError, CatalogResult};
use crate::model::AirportInput;
use crate::AirportCatalog;

pub type SharedCatalog = Arc<AirportCatalog>;

pub struct CatalogServer {
    catalog: SharedCatalog,
}

impl CatalogServer {
    pub fn new(catalog: SharedCatalog) -> Self {
        Self { catalog }
    }

    /// Serves until `shutdown` resolves.
    pub async fn run<F>(self, addr: SocketAddr, shutdown: F) -> Result<(), warp::Error>
    where
    F: Future<Output = ()> + Send + 'static,
    {
        let (bound, server) = warp::serve(routes(self.catalog)).try_bind_with_graceful_shutdown(addr, shutdown)?;
        info!(%bound, "Airport catalog listening");
        server.await;
        Ok(())
    }
}

/// Every HTTP route of the catalog, with CORS, request tracing and
/// rejection handling applied.
pub fn routes(catalog: SharedCatalog) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    // GET /airports
    let list = warp::path("airports")
    .and(warp::path::end())
    .and(warp::get())
    .and(with_catalog(catalog.clone()))
    .map(|catalog: SharedCatalog| respond(catalog.list(), StatusCode::OK));

    // POST /airports
    let create = warp::path("airports")
    .and(warp::path::end())
    .and(warp::post())
    .and(warp::body::json())
    .and(with_catalog(catalog.clone()))
    .map(|input: AirportInput, catalog: SharedCatalog| {
        let created = catalog.create(input).map(|c| {
            json!({ "status": "created", "id": c.reference, "identifier": c.identifier })
        });
        respond(created, StatusCode::CREATED)
    });

    // GET /airports/nearby?lat&lng&radius
    let nearby = warp::path!("airports" / "nearby")
    .and(warp::get())
    .and(warp::query::<HashMap<String, String>>())
    .and(with_catalog(catalog.clone()))
    .map(|params: HashMap<String, String>, catalog: SharedCatalog| {
        let hits = nearby_params(&params).and_then(|(lat, lng, radius)| catalog.nearby(lat, lng, radius));
        respond(hits, StatusCode::OK)
    });

    // GET /airports/popular?limit
    let popular = warp::path!("airports" / "popular")
    .and(warp::get())
    .and(warp::query::<HashMap<String, String>>())
    .and(with_catalog(catalog.clone()))
    .map(|params: HashMap<String, String>, catalog: SharedCatalog| {
        let top = parse_param::<usize>(&params, "limit").and_then(|k| catalog.popular(k));
        respond(top, StatusCode::OK)
    });

    // GET /airports/{identifier}
    let get = warp::path!("airports" / String)
    .and(warp::get())
    .and(with_catalog(catalog.clone()))
    .map(|code: String, catalog: SharedCatalog| respond(catalog.get(&code), StatusCode::OK));

    // PUT /airports/{identifier}
    let update = warp::path!("airports" / String)
    .and(warp::put())
    .and(warp::body::json())
    .and(with_catalog(catalog.clone()))
    .map(|code: String, input: AirportInput, catalog: SharedCatalog| {
        let updated = catalog.update(&code, input).map(|_| json!({ "status": "updated" }));
        respond(updated, StatusCode::OK)
    });

    // DELETE /airports/{identifier}
    let delete = warp::path!("airports" / String)
    .and(warp::delete())
    .and(with_catalog(catalog))
    .map(|code: String, catalog: SharedCatalog| {
        let deleted = catalog.delete(&code).map(|_| json!({ "status": "deleted" }));
        respond(deleted, StatusCode::OK)
    });

    let cors = warp::cors()
    .allow_any_origin()
    .allow_methods(vec!["GET", "POST", "PUT", "DELETE"])
    .allow_headers(vec!["content-type"]);

    // Paths are matched before methods so an unknown path stays a 404.
    // nearby and popular must be tried before the {identifier} routes.
    list.or(create)
    .or(nearby)
    .or(popular)
    .or(get)
    .or(update)
    .or(delete)
    .with(cors)
    .with(warp::trace::request())
    .recover(handle_rejection)
}

fn with_catalog(catalog: SharedCatalog) -> impl Filter<Extract = (SharedCatalog,), Error = Infallible> + Clone {
    warp::any().map(move || catalog.clone())
}

fn respond<T: Serialize>(result: CatalogResult<T>, ok: StatusCode) -> Response {
    match result {
        Ok(body) => warp::reply::with_status(warp::reply::json(&body), ok).into_response(),
        Err(e) => {
            if let CatalogError::Store(inner) = &e {
                error!(error = %inner, "Store failure while serving request");
            }
            error_reply(&e.to_string(), e.status_code())
        }
    }
}

fn error_reply(message: &str, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status).into_response()
}

fn nearby_params(params: &HashMap<String, String>) -> CatalogResult<(f64, f64, Option<f64>)> {
    let lat = parse_param::<f64>(params, "lat")?;
    let lng = parse_param::<f64>(params, "lng")?;
    let radius = parse_param::<f64>(params, "radius")?;
    match (lat, lng) {
        (Some(lat), Some(lng)) => Ok((lat, lng, radius)),
        _ => Err(CatalogError::Validation("lat and lng query parameters are required".to_string())),
    }
}

fn parse_param<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str) -> CatalogResult<Option<T>> {
    match params.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
        .parse::<T>()
        .map(Some)
        .map_err(|_| CatalogError::Validation(format!("{} must be a number, got {:?}", key, raw))),
    }
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e))
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected a JSON body".to_string())
    } else if err.find::<warp::filters::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, "CORS request forbidden".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!(?err, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(error_reply(&message, status))
}
