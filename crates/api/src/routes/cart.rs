//! Cart endpoints of the storefront.
//!
//! `/addtocart` identifies the user by the `userID` cookie set at login;
//! `/cart` and `/cancel` take it as a query parameter.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{CartItem, MessageResponse, ProductId, UserId};
use inventory::InventoryError;
use serde::Deserialize;

use super::payload;
use crate::error::ApiError;
use crate::state::InventoryServices;

pub fn router(inventory: Arc<InventoryServices>) -> Router {
    Router::new()
        .route("/addtocart", post(add_to_cart))
        .route("/cart", get(get_cart))
        .route("/cancel", post(cancel))
        .with_state(inventory)
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    #[serde(alias = "productID")]
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(rename = "userID")]
    pub user_id: Option<String>,
}

/// POST /addtocart
#[tracing::instrument(skip_all)]
pub async fn add_to_cart(
    State(inventory): State<Arc<InventoryServices>>,
    headers: HeaderMap,
    body: Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = cookie(&headers, "userID")
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))
        .and_then(|value| parse_user(&value))?;
    let item = payload(body)?;

    inventory
        .cart
        .add_to_cart(user_id, item.product_id, item.quantity)
        .await
        .map_err(|err| match err {
            InventoryError::ProductNotFound(_) => ApiError::NotFound("Product not found".into()),
            InventoryError::InsufficientStock { .. } => {
                ApiError::Conflict("Not enough stock available".into())
            }
            InventoryError::Validation(e) => ApiError::BadRequest(e.to_string()),
            other => {
                tracing::error!(error = %other, "failed to add item to cart");
                ApiError::Internal("Failed to add item to cart".into())
            }
        })?;

    tracing::info!(%user_id, "Successfully added item to cart");
    Ok(Json(MessageResponse::new("Item successfully added to cart")))
}

/// GET /cart?userID=
pub async fn get_cart(
    State(inventory): State<Arc<InventoryServices>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<CartItem>>, ApiError> {
    let user_id = required_user(query)?;
    let lines = inventory.cart.get_cart(user_id).await?;
    Ok(Json(
        lines
            .into_iter()
            .map(|line| CartItem::new(line.product_id, line.quantity))
            .collect(),
    ))
}

/// POST /cancel?userID=: empty the user's cart.
pub async fn cancel(
    State(inventory): State<Arc<InventoryServices>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = required_user(query)?;
    let removed = inventory.cart.cancel_cart(user_id).await?;
    tracing::info!(%user_id, removed, "cart cancelled");
    Ok(Json(MessageResponse::new("Cart items deleted successfully!")))
}

fn required_user(query: UserQuery) -> Result<UserId, ApiError> {
    match query.user_id.filter(|id| !id.is_empty()) {
        Some(id) => parse_user(&id),
        None => Err(ApiError::BadRequest("Missing userID parameter".to_string())),
    }
}

fn parse_user(value: &str) -> Result<UserId, ApiError> {
    value
        .trim()
        .parse::<i64>()
        .map(UserId::new)
        .map_err(|_| ApiError::BadRequest("Invalid user ID".to_string()))
}

/// Returns the value of a cookie from the `Cookie` headers.
fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
