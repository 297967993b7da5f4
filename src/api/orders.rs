use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::auth::AuthUser;
use super::error::validated;
use super::AppState;
use crate::domain::aggregates::OrderGroup;
use crate::domain::value_objects::ProductType;
use crate::store::Paginated;
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, max = 100))]
    pub cart_item_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams { pub page: Option<u32>, pub limit: Option<u32> }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest { pub order_group_id: Uuid }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelItemRequest { pub order_item_id: Uuid }

pub async fn place(State(s): State<AppState>, user: AuthUser, Json(req): Json<PlaceOrderRequest>) -> Result<(StatusCode, Json<OrderGroup>)> {
    let req = validated(req)?;
    Ok((StatusCode::CREATED, Json(s.services.orders.place(user.user_id, &req.cart_item_ids).await?)))
}

pub async fn list_group(
    State(s): State<AppState>, user: AuthUser, Path(product_type): Path<ProductType>, Query(p): Query<ListParams>,
) -> Result<Json<Paginated<OrderGroup>>> {
    Ok(Json(s.services.orders.list(user.user_id, product_type, p.page, p.limit).await?))
}

pub async fn view(State(s): State<AppState>, user: AuthUser, Path(group_id): Path<Uuid>) -> Result<Json<OrderGroup>> {
    Ok(Json(s.services.orders.view(user.user_id, group_id).await?))
}

pub async fn cancel(State(s): State<AppState>, user: AuthUser, Json(req): Json<CancelOrderRequest>) -> Result<Json<OrderGroup>> {
    Ok(Json(s.services.orders.cancel(user.user_id, req.order_group_id).await?))
}

pub async fn cancel_item(State(s): State<AppState>, user: AuthUser, Json(req): Json<CancelItemRequest>) -> Result<Json<OrderGroup>> {
    Ok(Json(s.services.orders.cancel_item(user.user_id, req.order_item_id).await?))
}
