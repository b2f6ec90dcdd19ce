use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::AuthContext;
use crate::http::middleware::BearerToken;
use crate::http::request::ApiJson;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::model::UserView;
use crate::services::{LoginRequest, LoginResponse, PasswordChange};

pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let tenant = request.tenant.clone();
    match state.crm.users.authenticate(request) {
        Ok(response) => {
            tracing::info!(user = %response.user.id, tenant = %tenant, "Login succeeded");
            Ok(Json(response))
        }
        Err(e) => {
            tracing::warn!(tenant = %tenant, error = %e, "Login failed");
            Err(e.into())
        }
    }
}

pub async fn logout(State(state): State<AppState>, BearerToken(token): BearerToken) -> StatusCode {
    state.crm.users.logout(&token);
    StatusCode::NO_CONTENT
}

pub async fn me(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Value>> {
    let user: UserView = state.crm.users.me(&ctx)?;
    let tenant = state.crm.tenants.current_tenant(&ctx)?;
    Ok(Json(json!({ "user": user, "tenant": tenant })))
}

pub async fn change_password(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiJson(change): ApiJson<PasswordChange>,
) -> ApiResult<StatusCode> {
    state.crm.users.change_password(&ctx, change)?;
    Ok(StatusCode::NO_CONTENT)
}
