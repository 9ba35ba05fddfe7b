use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orbitask_domain::User;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::{
    authenticate, extract_request_id, json_error, not_found, store_error, validation_error,
    ApiError, AppState,
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    full_name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    message: &'static str,
    user: User,
    token: String,
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let looks_valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !looks_valid {
        return Err(validation_error("email must be a valid address"));
    }
    Ok(email)
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    let email = validate_email(&req.email)?;
    if req.password.len() < 6 || req.password.len() > 100 {
        return Err(validation_error("password must be 6 to 100 characters"));
    }
    let full_name = req.full_name.trim();
    if full_name.len() < 2 || full_name.len() > 100 {
        return Err(validation_error("full_name must be 2 to 100 characters"));
    }

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!("auth.register", request_id = %request_id, email = %email);

    async {
        if state
            .store
            .find_user_by_email(&email)
            .await
            .map_err(store_error)?
            .is_some()
        {
            return Err(json_error(
                StatusCode::CONFLICT,
                "ERR_EMAIL_TAKEN",
                "this email is already registered",
            ));
        }

        let password_hash = orbitask_auth::hash_password(&req.password)
            .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.code, err.message))?;

        let user = state
            .store
            .create_user(&email, &password_hash, full_name)
            .await
            .map_err(|err| {
                if err.is_unique_violation() {
                    json_error(
                        StatusCode::CONFLICT,
                        "ERR_EMAIL_TAKEN",
                        "this email is already registered",
                    )
                } else {
                    store_error(err)
                }
            })?;

        let token = state
            .auth
            .issue(user.id, &user.email)
            .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.code, err.message))?;

        tracing::info!(user_id = %user.id, "user registered");

        Ok((
            StatusCode::CREATED,
            Json(SessionResponse {
                message: "user created",
                user,
                token,
            }),
        ))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let email = req.email.trim().to_lowercase();

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!("auth.login", request_id = %request_id, email = %email);

    async {
        let invalid_credentials = || {
            json_error(
                StatusCode::UNAUTHORIZED,
                "ERR_INVALID_CREDENTIALS",
                "email or password is incorrect",
            )
        };

        let credentials = state
            .store
            .find_user_by_email(&email)
            .await
            .map_err(store_error)?
            .ok_or_else(invalid_credentials)?;

        let password_ok =
            orbitask_auth::verify_password(&req.password, &credentials.password_hash)
                .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.code, err.message))?;
        if !password_ok {
            return Err(invalid_credentials());
        }

        let user = credentials.user;
        let token = state
            .auth
            .issue(user.id, &user.email)
            .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.code, err.message))?;

        tracing::info!(user_id = %user.id, "login succeeded");

        Ok(Json(SessionResponse {
            message: "login succeeded",
            user,
            token,
        }))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    user: User,
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;

    let user = state
        .store
        .find_user(claims.sub)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("token is valid but the user no longer exists"))?;

    Ok(Json(MeResponse { user }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_normalizes_case() {
        assert_eq!(validate_email(" Dev@Example.COM ").unwrap(), "dev@example.com");
    }

    #[test]
    fn email_validation_rejects_garbage() {
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@missing.local").is_err());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("").is_err());
    }
}
