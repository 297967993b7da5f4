use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::auth::{AdminUser, AuthUser};
use super::error::{optional_json, validated};
use super::AppState;
use crate::domain::aggregates::{NewProduct, Product, Resolution};
use crate::domain::value_objects::Pricing;
use crate::services::StockStatus;
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveParams {
    #[validate(length(min = 1))]
    pub size: String,
    #[validate(length(min = 1))]
    pub color: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    #[serde(default)]
    pub variant: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RepriceRequest {
    #[serde(default)]
    pub variant: Option<Uuid>,
    pub pricing: Pricing,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    #[serde(default)]
    pub variant: Option<Uuid>,
    pub stock: u32,
}

pub async fn create(State(s): State<AppState>, _admin: AdminUser, Json(input): Json<NewProduct>) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.services.catalog.create(input).await?)))
}

pub async fn view(State(s): State<AppState>, _user: AuthUser, Path(id_or_slug): Path<String>) -> Result<Response> {
    let view = s.services.catalog.view(&id_or_slug).await?;
    Ok(Json(&*view).into_response())
}

pub async fn resolve(
    State(s): State<AppState>, _user: AuthUser, Path(id_or_slug): Path<String>, Query(q): Query<ResolveParams>,
) -> Result<Json<Resolution>> {
    let q = validated(q)?;
    Ok(Json(s.services.catalog.resolve(&id_or_slug, &q.size, &q.color).await?))
}

pub async fn in_stock(
    State(s): State<AppState>, _user: AuthUser, Path(product_id): Path<Uuid>, body: Bytes,
) -> Result<Json<StockStatus>> {
    let q: StockQuery = optional_json(&body)?;
    Ok(Json(s.services.catalog.check_stock(product_id, q.variant).await?))
}

pub async fn reprice(
    State(s): State<AppState>, _admin: AdminUser, Path(product_id): Path<Uuid>, Json(req): Json<RepriceRequest>,
) -> Result<Json<Product>> {
    Ok(Json(s.services.catalog.reprice(product_id, req.variant, req.pricing).await?))
}

pub async fn set_stock(
    State(s): State<AppState>, _admin: AdminUser, Path(product_id): Path<Uuid>, Json(req): Json<SetStockRequest>,
) -> Result<Json<Product>> {
    Ok(Json(s.services.catalog.restock(product_id, req.variant, req.stock).await?))
}
