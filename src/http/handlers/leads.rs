use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::VersionQuery;
use crate::auth::AuthContext;
use crate::http::request::{ApiJson, ApiPath, ApiQuery};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::model::{Lead, LeadCategory, LeadId, LeadSource, Page, PageRequest, UserId};
use crate::services::{
    AssignRequest, Board, BulkAssign, BulkAssignResult, CategoryChange, LeadFilter, LeadPatch,
    NewLead, TransitionOptions,
};

/// `GET /leads` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LeadQuery {
    pub category: Option<LeadCategory>,
    pub assignee: Option<UserId>,
    pub source: Option<LeadSource>,
    pub tag: Option<String>,
    pub q: Option<String>,
    pub include_archived: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl LeadQuery {
    fn split(self) -> (LeadFilter, PageRequest) {
        (
            LeadFilter {
                category: self.category,
                assignee: self.assignee,
                source: self.source,
                tag: self.tag,
                q: self.q,
                include_archived: self.include_archived.unwrap_or(false),
            },
            PageRequest {
                page: self.page,
                per_page: self.per_page,
            },
        )
    }
}

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiQuery(query): ApiQuery<LeadQuery>,
) -> ApiResult<Json<Page<Lead>>> {
    let (filter, page) = query.split();
    Ok(Json(state.crm.leads.list_leads(&ctx, &filter, page)?))
}

pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiJson(input): ApiJson<NewLead>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    let lead = state.crm.leads.create_lead(&ctx, input)?;
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn board(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Board>> {
    Ok(Json(state.crm.leads.board(&ctx)?))
}

pub async fn bulk_assign(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiJson(request): ApiJson<BulkAssign>,
) -> ApiResult<Json<BulkAssignResult>> {
    Ok(Json(state.crm.leads.bulk_assign(&ctx, request).await?))
}

pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<LeadId>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(state.crm.leads.get_lead(&ctx, id)?))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<LeadId>,
    ApiJson(patch): ApiJson<LeadPatch>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(state.crm.leads.update_lead(&ctx, id, patch).await?))
}

pub async fn archive(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<LeadId>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(state.crm.leads.archive_lead(&ctx, id).await?))
}

pub async fn transitions(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<LeadId>,
) -> ApiResult<Json<TransitionOptions>> {
    Ok(Json(state.crm.leads.allowed_transitions(&ctx, id)?))
}

pub async fn change_category(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<LeadId>,
    ApiJson(change): ApiJson<CategoryChange>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(state.crm.leads.change_category(&ctx, id, change).await?))
}

pub async fn assign(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<LeadId>,
    ApiJson(request): ApiJson<AssignRequest>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(state.crm.leads.assign(&ctx, id, request).await?))
}

pub async fn unassign(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<LeadId>,
    ApiQuery(version): ApiQuery<VersionQuery>,
) -> ApiResult<Json<Lead>> {
    Ok(Json(
        state
            .crm
            .leads
            .unassign(&ctx, id, version.expected_version)
            .await?,
    ))
}
