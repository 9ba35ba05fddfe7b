use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orbitask_domain::Role;
use orbitask_store::MemberRecord;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    authenticate, extract_request_id, json_error, not_found, require_role, station_role,
    store_error, validation_error, ApiError, AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleChangeBlock {
    OwnerPinned,
    GrantTooHigh,
}

/// The owner's role is not a membership attribute and never changes here;
/// everyone else only receives roles strictly below the grantor's own.
fn role_change_block(
    owner_id: Uuid,
    target_id: Uuid,
    caller: Role,
    requested: Role,
) -> Option<RoleChangeBlock> {
    if target_id == owner_id {
        Some(RoleChangeBlock::OwnerPinned)
    } else if requested >= caller {
        Some(RoleChangeBlock::GrantTooHigh)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalBlock {
    Owner,
    Yourself,
}

fn removal_block(owner_id: Uuid, caller_id: Uuid, target_id: Uuid) -> Option<RemovalBlock> {
    if target_id == owner_id {
        Some(RemovalBlock::Owner)
    } else if target_id == caller_id {
        Some(RemovalBlock::Yourself)
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    email: String,
    role: Role,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    message: &'static str,
    member: MemberRecord,
}

pub async fn add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(station_id): Path<Uuid>,
    req: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    if req.role == Role::Owner {
        return Err(validation_error("a station has exactly one owner"));
    }

    let (_, caller_role) = station_role(&state, station_id, claims.sub).await?;
    require_role(caller_role, Role::Admin)?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "member.add",
        request_id = %request_id,
        user_id = %claims.sub,
        station_id = %station_id,
    );

    async {
        let target = state
            .store
            .find_user_by_email(req.email.trim().to_lowercase().as_str())
            .await
            .map_err(store_error)?
            .ok_or_else(|| not_found("no user is registered with this email"))?;

        let member = state
            .store
            .add_member(station_id, target.user.id, req.role)
            .await
            .map_err(|err| {
                if err.is_unique_violation() {
                    json_error(
                        StatusCode::CONFLICT,
                        "ERR_ALREADY_MEMBER",
                        "this user is already a member of the station",
                    )
                } else {
                    store_error(err)
                }
            })?;

        tracing::info!(member_id = %member.user.id, role = member.role.as_str(), "member added");

        Ok((
            StatusCode::CREATED,
            Json(MemberResponse {
                message: "member added",
                member,
            }),
        ))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Serialize)]
pub struct MemberListResponse {
    message: String,
    members: Vec<MemberRecord>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(station_id): Path<Uuid>,
) -> Result<Json<MemberListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    station_role(&state, station_id, claims.sub).await?;

    let members = state
        .store
        .members_of(station_id)
        .await
        .map_err(store_error)?;

    Ok(Json(MemberListResponse {
        message: format!("{} member(s) found", members.len()),
        members,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    role: Role,
}

pub async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((station_id, target_id)): Path<(Uuid, Uuid)>,
    req: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Result<Json<MemberResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    let (station, caller_role) = station_role(&state, station_id, claims.sub).await?;
    require_role(caller_role, Role::Admin)?;

    match role_change_block(station.owner_id, target_id, caller_role, req.role) {
        Some(RoleChangeBlock::OwnerPinned) => {
            return Err(validation_error("the station owner's role cannot be changed"));
        }
        Some(RoleChangeBlock::GrantTooHigh) => {
            return Err(json_error(
                StatusCode::FORBIDDEN,
                "ERR_FORBIDDEN",
                "you cannot grant a role equal to or above your own",
            ));
        }
        None => {}
    }

    let member = state
        .store
        .update_member_role(station_id, target_id, req.role)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("this user is not a member of the station"))?;

    Ok(Json(MemberResponse {
        message: "member role updated",
        member,
    }))
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    message: &'static str,
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((station_id, target_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let (station, caller_role) = station_role(&state, station_id, claims.sub).await?;
    require_role(caller_role, Role::Admin)?;

    match removal_block(station.owner_id, claims.sub, target_id) {
        Some(RemovalBlock::Owner) => {
            return Err(validation_error("the station owner cannot be removed"));
        }
        Some(RemovalBlock::Yourself) => {
            return Err(validation_error("you cannot remove yourself from the station"));
        }
        None => {}
    }

    let removed = state
        .store
        .remove_member(station_id, target_id)
        .await
        .map_err(store_error)?;
    if !removed {
        return Err(not_found("this user is not a member of the station"));
    }

    Ok(Json(RemovedResponse {
        message: "member removed",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_owner_role_is_pinned_even_for_the_owner_themselves() {
        let owner = Uuid::new_v4();
        for caller in [Role::Admin, Role::Owner] {
            assert_eq!(
                role_change_block(owner, owner, caller, Role::Member),
                Some(RoleChangeBlock::OwnerPinned),
            );
        }
    }

    #[test]
    fn grants_at_or_above_the_callers_level_are_blocked() {
        let owner = Uuid::new_v4();
        let target = Uuid::new_v4();

        assert_eq!(
            role_change_block(owner, target, Role::Admin, Role::Admin),
            Some(RoleChangeBlock::GrantTooHigh),
        );
        assert_eq!(
            role_change_block(owner, target, Role::Admin, Role::Owner),
            Some(RoleChangeBlock::GrantTooHigh),
        );
        assert_eq!(
            role_change_block(owner, target, Role::Admin, Role::Leader),
            None,
        );
        assert_eq!(
            role_change_block(owner, target, Role::Owner, Role::Admin),
            None,
        );
    }

    #[test]
    fn the_owner_and_the_caller_cannot_be_removed() {
        let owner = Uuid::new_v4();
        let caller = Uuid::new_v4();
        let target = Uuid::new_v4();

        assert_eq!(removal_block(owner, caller, owner), Some(RemovalBlock::Owner));
        assert_eq!(
            removal_block(owner, caller, caller),
            Some(RemovalBlock::Yourself),
        );
        assert_eq!(removal_block(owner, caller, target), None);
    }

    #[test]
    fn an_owner_target_outranks_the_self_removal_rule() {
        // The caller owning the station still gets the owner message.
        let owner = Uuid::new_v4();
        assert_eq!(removal_block(owner, owner, owner), Some(RemovalBlock::Owner));
    }
}
