use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::http::request::{ApiJson, ApiPath, ApiQuery};
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::model::{LeadId, Page, PageRequest, Quote, QuoteId, QuoteStatus};
use crate::services::{NewQuote, QuoteFilter, QuotePatch};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuoteQuery {
    pub lead_id: Option<LeadId>,
    pub status: Option<QuoteStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiQuery(query): ApiQuery<QuoteQuery>,
) -> ApiResult<Json<Page<Quote>>> {
    let filter = QuoteFilter {
        lead_id: query.lead_id,
        status: query.status,
    };
    let page = PageRequest {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.crm.quotes.list_quotes(&ctx, &filter, page)?))
}

pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiJson(input): ApiJson<NewQuote>,
) -> ApiResult<(StatusCode, Json<Quote>)> {
    let quote = state.crm.quotes.create_quote(&ctx, input)?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<QuoteId>,
) -> ApiResult<Json<Quote>> {
    Ok(Json(state.crm.quotes.get_quote(&ctx, id)?))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<QuoteId>,
    ApiJson(patch): ApiJson<QuotePatch>,
) -> ApiResult<Json<Quote>> {
    Ok(Json(state.crm.quotes.update_quote(&ctx, id, patch).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<QuoteId>,
) -> ApiResult<StatusCode> {
    state.crm.quotes.delete_quote(&ctx, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<QuoteId>,
) -> ApiResult<Json<Quote>> {
    Ok(Json(state.crm.quotes.send_quote(&ctx, id).await?))
}

pub async fn accept(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<QuoteId>,
) -> ApiResult<Json<Quote>> {
    Ok(Json(state.crm.quotes.accept_quote(&ctx, id).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    ctx: AuthContext,
    ApiPath(id): ApiPath<QuoteId>,
) -> ApiResult<Json<Quote>> {
    Ok(Json(state.crm.quotes.reject_quote(&ctx, id).await?))
}
