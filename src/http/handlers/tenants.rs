use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::auth::AuthContext;
use crate::http::request::{ApiJson, ApiPath, ApiQuery};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::model::{Page, PageRequest, Tenant, TenantId, TenantStatus};
use crate::services::{NewTenant, TenantCreated, TenantPatch};

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Page<Tenant>>> {
    Ok(Json(state.crm.tenants.list_tenants(&ctx, page)?))
}

pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiJson(input): ApiJson<NewTenant>,
) -> ApiResult<(StatusCode, Json<TenantCreated>)> {
    let created = state.crm.tenants.create_tenant(&ctx, input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<TenantId>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.crm.tenants.get_tenant(&ctx, id)?))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<TenantId>,
    ApiJson(patch): ApiJson<TenantPatch>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.crm.tenants.update_tenant(&ctx, id, patch)?))
}

pub async fn suspend(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<TenantId>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(
        state.crm.tenants.set_status(&ctx, id, TenantStatus::Suspended)?,
    ))
}

pub async fn activate(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<TenantId>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(
        state.crm.tenants.set_status(&ctx, id, TenantStatus::Active)?,
    ))
}

pub async fn current(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Tenant>> {
    Ok(Json(state.crm.tenants.current_tenant(&ctx)?))
}

pub async fn update_current(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiJson(patch): ApiJson<TenantPatch>,
) -> ApiResult<Json<Tenant>> {
    let id = ctx.tenant_id;
    Ok(Json(state.crm.tenants.update_tenant(&ctx, id, patch)?))
}
