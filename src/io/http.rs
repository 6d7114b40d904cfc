//! Read-only query API and health endpoint
//!
//! Routes:
//! - `GET /vehicles` - every vehicle that has reported
//! - `GET /vehicles/{id}/location` - latest sighting
//! - `GET /vehicles/{id}/history?start=&end=` - sightings in an inclusive window
//! - `GET /healthz` - dependency status
//!
//! Uses hyper for the HTTP server.

use crate::domain::{HistoryQuery, VehicleLocation};
use crate::io::mqtt::ConnectionState;
use crate::io::publisher::AlertPublisher;
use crate::io::store::LocationStore;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Flattened sighting as returned by the query API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationResponse {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
}

impl From<&VehicleLocation> for LocationResponse {
    fn from(vl: &VehicleLocation) -> Self {
        Self {
            vehicle_id: vl.vehicle_id.clone(),
            latitude: vl.location.latitude,
            longitude: vl.location.longitude,
            timestamp: vl.unix_timestamp(),
        }
    }
}

/// Everything the HTTP handlers read from
pub struct QueryApi {
    store: Arc<dyn LocationStore>,
    publisher: Arc<dyn AlertPublisher>,
    mqtt: ConnectionState,
}

impl QueryApi {
    pub fn new(
        store: Arc<dyn LocationStore>,
        publisher: Arc<dyn AlertPublisher>,
        mqtt: ConnectionState,
    ) -> Self {
        Self { store, publisher, mqtt }
    }

    /// Dispatch one request; returns status and JSON body
    pub async fn route(&self, method: &Method, path: &str, query: Option<&str>) -> (StatusCode, Value) {
        if *method != Method::GET {
            return error_body(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["healthz"] => self.health().await,
            ["vehicles"] => self.all_vehicles().await,
            ["vehicles", vehicle_id, "location"] if !vehicle_id.is_empty() => {
                self.latest_location(vehicle_id).await
            }
            ["vehicles", vehicle_id, "history"] if !vehicle_id.is_empty() => {
                self.history(vehicle_id, query).await
            }
            _ => error_body(StatusCode::NOT_FOUND, "not found"),
        }
    }

    async fn all_vehicles(&self) -> (StatusCode, Value) {
        match self.store.get_all_vehicles().await {
            Ok(vehicles) => (StatusCode::OK, json!(vehicles)),
            Err(e) => {
                error!(error = %e, "http_get_vehicles_failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch vehicles")
            }
        }
    }

    async fn latest_location(&self, vehicle_id: &str) -> (StatusCode, Value) {
        match self.store.get_latest(vehicle_id).await {
            Ok(vl) => (StatusCode::OK, json!(LocationResponse::from(&vl))),
            Err(e) if e.is_not_found() => error_body(StatusCode::NOT_FOUND, "vehicle not found"),
            Err(e) => {
                error!(vehicle_id = %vehicle_id, error = %e, "http_get_latest_failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch location")
            }
        }
    }

    async fn history(&self, vehicle_id: &str, query: Option<&str>) -> (StatusCode, Value) {
        let Some(start) = query_param(query, "start").and_then(|v| v.parse::<i64>().ok()) else {
            return error_body(StatusCode::BAD_REQUEST, "invalid start parameter");
        };
        let Some(end) = query_param(query, "end").and_then(|v| v.parse::<i64>().ok()) else {
            return error_body(StatusCode::BAD_REQUEST, "invalid end parameter");
        };
        let Some(history_query) = HistoryQuery::from_unix(vehicle_id, start, end) else {
            return error_body(StatusCode::BAD_REQUEST, "invalid time range");
        };

        match self.store.get_history(&history_query).await {
            Ok(locations) => {
                let body: Vec<LocationResponse> = locations.iter().map(LocationResponse::from).collect();
                (StatusCode::OK, json!(body))
            }
            Err(e) => {
                error!(vehicle_id = %vehicle_id, error = %e, "http_get_history_failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch history")
            }
        }
    }

    async fn health(&self) -> (StatusCode, Value) {
        let mut deps = Map::new();
        let mut healthy = true;

        match self.store.ping().await {
            Ok(()) => {
                deps.insert("postgres".into(), json!({"status": "up"}));
            }
            Err(e) => {
                healthy = false;
                deps.insert("postgres".into(), json!({"status": "down", "error": e.to_string()}));
            }
        }

        if self.publisher.is_connected() {
            deps.insert("rabbitmq".into(), json!({"status": "up"}));
        } else {
            healthy = false;
            deps.insert("rabbitmq".into(), json!({"status": "down", "error": "connection closed"}));
        }

        if self.mqtt.is_connected() {
            deps.insert("mqtt".into(), json!({"status": "up"}));
        } else {
            healthy = false;
            deps.insert("mqtt".into(), json!({"status": "down", "error": "not connected"}));
        }

        let (status, overall) = if healthy {
            (StatusCode::OK, "healthy")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        };
        (status, json!({"status": overall, "dependencies": deps}))
    }
}

fn error_body(status: StatusCode, message: &str) -> (StatusCode, Value) {
    (status, json!({ "error": message }))
}

/// Value of `key` in a raw `a=1&b=2` query string
fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').filter_map(|pair| pair.split_once('=')).find(|(k, _)| *k == key).map(|(_, v)| v)
}

async fn handle_request(
    req: Request<Incoming>,
    api: Arc<QueryApi>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, body) = api.route(req.method(), req.uri().path(), req.uri().query()).await;
    if status.is_client_error() {
        warn!(method = %req.method(), path = %req.uri().path(), status = %status.as_u16(), "http_request_rejected");
    }

    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail"))
}

/// Start the query API HTTP server
pub async fn start_http_server(
    port: u16,
    api: Arc<QueryApi>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let api = api.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let api = api.clone();
                                async move { handle_request(req, api).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
