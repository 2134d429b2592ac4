//! HTTP API for a coordinator node.
//!
//! Wire contract (paths are case-sensitive, POST success is 201):
//! - `GET  /v1/coordinator`          known coordinator descriptors
//! - `POST /v1/coordinator`          announce a coordinator
//! - `GET  /v1/listings`             service names with live listings
//! - `GET  /v1/listings/:service`    listings for one service, 404 if unknown
//! - `POST /v1/listings`             add a listing; `?heartbeat=true` for
//!                                   heartbeat-or-create semantics
//! - `GET  /status`                  liveness probe

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::Error;
use crate::coordinator::listings::ListingsBroker;
use crate::coordinator::membership::CoordinatorBroker;
use crate::common::{CoordinatorDescriptor, Listing};

/// Shared coordinator state for HTTP handlers.
#[derive(Clone)]
pub struct CoordState {
    pub membership: Arc<CoordinatorBroker>,
    pub listings: Arc<ListingsBroker>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        .route(
            "/v1/coordinator",
            get(get_coordinators).post(add_coordinator),
        )
        .route("/v1/listings", get(get_services).post(post_listing))
        .route("/v1/listings/:service", get(get_service_listings))
        .route("/status", get(status))
        .with_state(state)
}

async fn get_coordinators(State(state): State<CoordState>) -> impl IntoResponse {
    Json(state.membership.get_coordinators())
}

async fn add_coordinator(
    State(state): State<CoordState>,
    Json(body): Json<Value>,
) -> Result<StatusCode, Error> {
    let coordinator = CoordinatorDescriptor::from_value(body)?;
    state.membership.add_coordinator(coordinator)?;
    Ok(StatusCode::CREATED)
}

async fn get_services(State(state): State<CoordState>) -> impl IntoResponse {
    Json(state.listings.get_services())
}

async fn get_service_listings(
    State(state): State<CoordState>,
    Path(service): Path<String>,
) -> Result<Json<Vec<Listing>>, Error> {
    match state.listings.get_service_listings(&service) {
        Some(listings) => Ok(Json(listings)),
        None => Err(Error::NotFound(service)),
    }
}

#[derive(Debug, Deserialize)]
struct ListingParams {
    #[serde(default)]
    heartbeat: bool,
}

async fn post_listing(
    State(state): State<CoordState>,
    Query(params): Query<ListingParams>,
    Json(body): Json<Value>,
) -> Result<StatusCode, Error> {
    let listing = Listing::from_value(body)?;
    if params.heartbeat {
        state.listings.listing_heartbeat(listing)?;
    } else {
        state.listings.add_listing(listing)?;
    }
    Ok(StatusCode::CREATED)
}

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
