use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::auth::AuthContext;
use crate::http::request::{ApiJson, ApiPath, ApiQuery};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::model::{Activity, LeadId, Page, PageRequest};
use crate::services::NewInteraction;

pub async fn list_for_lead(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(lead_id): ApiPath<LeadId>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Page<Activity>>> {
    Ok(Json(state.crm.activities.list_for_lead(&ctx, lead_id, page)?))
}

pub async fn log(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(lead_id): ApiPath<LeadId>,
    ApiJson(input): ApiJson<NewInteraction>,
) -> ApiResult<(StatusCode, Json<Activity>)> {
    let activity = state.crm.activities.log_interaction(&ctx, lead_id, input)?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn feed(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Page<Activity>>> {
    Ok(Json(state.crm.activities.list_for_tenant(&ctx, page)?))
}
