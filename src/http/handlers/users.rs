use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::auth::AuthContext;
use crate::http::request::{ApiJson, ApiPath, ApiQuery};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::model::{Page, PageRequest, UserId, UserView};
use crate::services::{NewUser, UserPatch};

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Page<UserView>>> {
    Ok(Json(state.crm.users.list_users(&ctx, page)?))
}

pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiJson(input): ApiJson<NewUser>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    let user = state.crm.users.create_user(&ctx, input)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(state.crm.users.get_user(&ctx, id)?))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(state.crm.users.update_user(&ctx, id, patch)?))
}

pub async fn activate(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(state.crm.users.set_active(&ctx, id, true)?))
}

pub async fn deactivate(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(state.crm.users.set_active(&ctx, id, false)?))
}
