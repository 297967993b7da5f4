use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::auth::AuthUser;
use super::error::{optional_json, validated};
use super::AppState;
use crate::domain::aggregates::{CartLine, WishlistItem};
use crate::domain::value_objects::ProductType;
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToWishlistRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWishlistRequest {
    #[serde(default)]
    pub variant: Option<Uuid>,
}

fn one() -> u32 { 1 }

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MoveToCartRequest {
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    #[serde(default)]
    pub product_type: ProductType,
    #[serde(default)]
    #[validate(range(min = 1, max = 365))]
    pub rent_days: Option<u32>,
}

impl Default for MoveToCartRequest {
    fn default() -> Self { Self { quantity: 1, product_type: ProductType::Buy, rent_days: None } }
}

pub async fn list(State(s): State<AppState>, user: AuthUser) -> Result<Response> {
    let view = s.services.wishlist.view(user.user_id).await?;
    Ok(Json(&*view).into_response())
}

pub async fn create(
    State(s): State<AppState>, user: AuthUser, Json(req): Json<AddToWishlistRequest>,
) -> Result<(StatusCode, Json<WishlistItem>)> {
    let item = s.services.wishlist.add(user.user_id, req.product_id, req.variant).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update(
    State(s): State<AppState>, user: AuthUser, Path(item_id): Path<Uuid>, Json(req): Json<UpdateWishlistRequest>,
) -> Result<Json<WishlistItem>> {
    Ok(Json(s.services.wishlist.change_variant(user.user_id, item_id, req.variant).await?))
}

pub async fn delete(State(s): State<AppState>, user: AuthUser, Path(item_id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let removed = s.services.wishlist.remove(user.user_id, item_id).await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn move_to_cart(
    State(s): State<AppState>, user: AuthUser, Path(item_id): Path<Uuid>, body: Bytes,
) -> Result<(StatusCode, Json<CartLine>)> {
    let req = validated(optional_json::<MoveToCartRequest>(&body)?)?;
    let line = s.services.wishlist.move_to_cart(user.user_id, item_id, req.quantity, req.product_type, req.rent_days).await?;
    Ok((StatusCode::CREATED, Json(line)))
}
