use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orbitask_domain::{Role, Station};
use orbitask_store::StationWithRole;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    authenticate, extract_request_id, not_found, require_role, station_role, store_error,
    validation_error, ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateStationRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StationResponse {
    message: &'static str,
    station: Station,
}

fn validate_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(validation_error("name must be 1 to 100 characters"));
    }
    Ok(name)
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<CreateStationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StationResponse>), ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let name = validate_name(&req.name)?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "station.create",
        request_id = %request_id,
        user_id = %claims.sub,
    );

    async {
        let station = state
            .store
            .create_station(name, req.description.as_deref(), claims.sub)
            .await
            .map_err(store_error)?;

        tracing::info!(station_id = %station.id, "station created");

        Ok((
            StatusCode::CREATED,
            Json(StationResponse {
                message: "station created",
                station,
            }),
        ))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Serialize)]
pub struct StationListResponse {
    message: String,
    stations: Vec<StationWithRole>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StationListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;

    let stations = state
        .store
        .stations_for_user(claims.sub)
        .await
        .map_err(store_error)?;

    Ok(Json(StationListResponse {
        message: format!("{} station(s) found", stations.len()),
        stations,
    }))
}

#[derive(Debug, Serialize)]
pub struct StationDetailResponse {
    station: Station,
    role: Role,
}

pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<StationDetailResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let (station, role) = station_role(&state, id, claims.sub).await?;

    Ok(Json(StationDetailResponse { station, role }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStationRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<UpdateStationRequest>, JsonRejection>,
) -> Result<Json<StationResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    let name = match req.name.as_deref() {
        Some(raw) => Some(validate_name(raw)?),
        None => None,
    };

    let (_, role) = station_role(&state, id, claims.sub).await?;
    require_role(role, Role::Admin)?;

    let station = state
        .store
        .update_station(id, name, req.description.as_deref())
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("station not found"))?;

    Ok(Json(StationResponse {
        message: "station updated",
        station,
    }))
}

/// Soft delete. Owner only.
pub async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<StationResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let (_, role) = station_role(&state, id, claims.sub).await?;
    require_role(role, Role::Owner)?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "station.complete",
        request_id = %request_id,
        user_id = %claims.sub,
        station_id = %id,
    );

    async {
        let station = state
            .store
            .complete_station(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| not_found("station not found"))?;

        tracing::info!("station completed");

        Ok(Json(StationResponse {
            message: "station completed",
            station,
        }))
    }
    .instrument(span)
    .await
}
