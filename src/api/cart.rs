use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::auth::AuthUser;
use super::error::validated;
use super::AppState;
use crate::domain::aggregates::{CartLine, QuantityChange, QuantityOutcome};
use crate::domain::value_objects::ProductType;
use crate::services::LineRequest;
use crate::Result;

fn one() -> u32 { 1 }

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant: Option<Uuid>,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    #[serde(default)]
    pub product_type: ProductType,
    #[serde(default)]
    #[validate(range(min = 1, max = 365))]
    pub rent_days: Option<u32>,
}

/// `PATCH /cart/:id` body, tagged by `action`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UpdateCartRequest {
    ChangeVariant { variant: Option<Uuid> },
    SetRentDays {
        #[serde(rename = "rentDays")]
        rent_days: Option<u32>,
    },
    SetQuantity { quantity: u32 },
    Increment,
    Decrement,
}

pub async fn view(State(s): State<AppState>, user: AuthUser) -> Result<Response> {
    let view = s.services.cart.view(user.user_id).await?;
    Ok(Json(&*view).into_response())
}

pub async fn add(State(s): State<AppState>, user: AuthUser, Json(req): Json<AddToCartRequest>) -> Result<(StatusCode, Json<CartLine>)> {
    let req = validated(req)?;
    let line = s.services.cart.add(user.user_id, LineRequest {
        product_id: req.product_id,
        variant_id: req.variant,
        quantity: req.quantity,
        product_type: req.product_type,
        rent_days: req.rent_days,
    }).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn update(
    State(s): State<AppState>, user: AuthUser, Path(line_id): Path<Uuid>, Json(req): Json<UpdateCartRequest>,
) -> Result<Json<QuantityOutcome>> {
    let cart = &s.services.cart;
    let outcome = match req {
        UpdateCartRequest::ChangeVariant { variant } => QuantityOutcome::Updated(cart.change_variant(user.user_id, line_id, variant).await?),
        UpdateCartRequest::SetRentDays { rent_days } => QuantityOutcome::Updated(cart.set_rent_days(user.user_id, line_id, rent_days).await?),
        UpdateCartRequest::SetQuantity { quantity } => cart.change_quantity(user.user_id, line_id, QuantityChange::Set(quantity)).await?,
        UpdateCartRequest::Increment => cart.change_quantity(user.user_id, line_id, QuantityChange::Increment).await?,
        UpdateCartRequest::Decrement => cart.change_quantity(user.user_id, line_id, QuantityChange::Decrement).await?,
    };
    Ok(Json(outcome))
}

pub async fn remove(State(s): State<AppState>, user: AuthUser, Path(line_id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let removed = s.services.cart.remove(user.user_id, line_id).await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn empty(State(s): State<AppState>, user: AuthUser) -> Result<Json<serde_json::Value>> {
    let removed = s.services.cart.empty(user.user_id).await?;
    Ok(Json(json!({ "removed": removed })))
}
