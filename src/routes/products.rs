//! Product catalog endpoints, including tag association.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;
use crate::models::{NewProduct, Product, ProductUpdate, ProductWithLastReading};
use crate::store::{self, StoreError, LIST_LIMIT};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/products", get(list).post(create))
        .route("/products/with-last-reading", get(with_last_reading))
        .route("/products/by-tag/{tag_id}", get(by_tag))
        .route("/products/{id}", get(get_one).put(update).delete(remove))
        .route("/products/{id}/associate-tag", put(associate_tag))
}

#[derive(Debug, Deserialize)]
struct AssociateQuery {
    tag_id: String,
}

fn product_not_found(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound => ApiError::not_found("product"),
        other => other.into(),
    }
}

/// Trim a tag, treating blank as no tag.
fn clean_tag(tag: Option<String>) -> Option<String> {
    tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

async fn create(
    State(state): State<AppState>,
    Json(mut body): Json<NewProduct>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    body.tag_id = clean_tag(body.tag_id);

    let product = state.products.create(body).await?;
    info!("POST /products - created {} ({})", product.id, product.name);
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.products.list(LIST_LIMIT).await?))
}

async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let product = state.products.get(id).await?;
    product.map(Json).ok_or_else(|| ApiError::not_found("product"))
}

async fn by_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = state.products.find_by_tag(&tag_id).await?;
    product.map(Json).ok_or_else(|| ApiError::not_found("product"))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProductUpdate>,
) -> Result<Json<Product>, ApiError> {
    // ---
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let product = state
        .products
        .update(id, body)
        .await
        .map_err(product_not_found)?;
    info!("PUT /products/{} - updated", id);
    Ok(Json(product))
}

async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    // ---
    state.products.delete(id).await.map_err(product_not_found)?;
    info!("DELETE /products/{} - removed", id);
    Ok(Json(json!({ "message": "product deleted" })))
}

/// `PUT /products/{id}/associate-tag?tag_id=...`
///
/// Fails with 409 when another product already holds the tag; neither product
/// is modified in that case.
async fn associate_tag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AssociateQuery>,
) -> Result<Json<Product>, ApiError> {
    // ---
    let tag_id = query.tag_id.trim();
    if tag_id.is_empty() {
        return Err(ApiError::BadRequest("tag_id must not be empty".to_string()));
    }

    let product = store::associate_tag(state.products.as_ref(), id, tag_id)
        .await
        .map_err(product_not_found)?;
    info!("PUT /products/{}/associate-tag - now holds {}", id, tag_id);
    Ok(Json(product))
}

/// Every product with the time and state of the newest reading for its tag.
async fn with_last_reading(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductWithLastReading>>, ApiError> {
    // ---
    let products = state.products.list(LIST_LIMIT).await?;
    let mut views = Vec::with_capacity(products.len());

    for product in products {
        let last = match product.tag_id.as_deref() {
            Some(tag_id) => state.readings.latest_for_tag(tag_id).await?,
            None => None,
        };
        views.push(ProductWithLastReading {
            last_reading_timestamp: last.as_ref().map(|r| r.timestamp),
            last_state: last.map(|r| r.state),
            product,
        });
    }

    Ok(Json(views))
}

#[cfg(test)]
mod tests {
    // ---
    use crate::routes::testing::{app, send};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn create(app: &axum::Router, body: Value) -> Value {
        let (status, product) = send(app, "POST", "/products", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        product
    }

    #[tokio::test]
    async fn test_product_crud() {
        // ---
        let (app, _) = app();
        let product = create(
            &app,
            json!({ "name": "Vaccines", "acceptable_range": { "min": 2, "max": 8 } }),
        )
        .await;
        let uri = format!("/products/{}", product["id"].as_str().unwrap());
        assert!(product["tag_id"].is_null());

        let (status, fetched) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, product);

        let (status, updated) = send(
            &app,
            "PUT",
            &uri,
            Some(json!({ "acceptable_range": { "min": 8, "max": 2 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Vaccines");
        assert_eq!(updated["acceptable_range"]["min"], 8.0);

        let (status, list) = send(&app, "GET", "/products", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "product not found");
    }

    #[tokio::test]
    async fn test_create_with_taken_tag_conflicts() {
        // ---
        let (app, _) = app();
        create(&app, json!({ "name": "Vaccines", "tag_id": "T1" })).await;

        let (status, body) = send(
            &app,
            "POST",
            "/products",
            Some(json!({ "name": "Plasma", "tag_id": "T1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_associate_tag_conflict_leaves_products_unchanged() {
        // ---
        let (app, _) = app();
        let holder = create(&app, json!({ "name": "Vaccines", "tag_id": "T1" })).await;
        let other = create(&app, json!({ "name": "Plasma" })).await;
        let other_uri = format!("/products/{}", other["id"].as_str().unwrap());

        let (status, _) = send(
            &app,
            "PUT",
            &format!("{other_uri}/associate-tag?tag_id=T1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, by_tag) = send(&app, "GET", "/products/by-tag/T1", None).await;
        assert_eq!(by_tag, holder);
        let (_, unchanged) = send(&app, "GET", &other_uri, None).await;
        assert_eq!(unchanged, other);

        let (status, associated) = send(
            &app,
            "PUT",
            &format!("{other_uri}/associate-tag?tag_id=T2"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(associated["tag_id"], "T2");
    }

    #[tokio::test]
    async fn test_associate_unknown_product_is_not_found() {
        // ---
        let (app, _) = app();
        let uri = format!("/products/{}/associate-tag?tag_id=T1", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "PUT", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_with_last_reading() {
        // ---
        let (app, _) = app();
        create(
            &app,
            json!({ "name": "Vaccines", "tag_id": "T1", "acceptable_range": { "min": 2, "max": 8 } }),
        )
        .await;
        create(&app, json!({ "name": "Untagged" })).await;

        for (temp, ts) in [(5, "2025-03-26T10:00:00Z"), (12, "2025-03-26T11:00:00Z")] {
            send(
                &app,
                "POST",
                "/readings",
                Some(json!({ "tag_id": "T1", "temperature": temp, "timestamp": ts })),
            )
            .await;
        }

        let (status, body) = send(&app, "GET", "/products/with-last-reading", None).await;
        assert_eq!(status, StatusCode::OK);
        let views = body.as_array().unwrap();
        assert_eq!(views.len(), 2);

        let tagged = views.iter().find(|v| v["tag_id"] == "T1").unwrap();
        assert_eq!(tagged["last_state"], "ALERTA");
        assert_eq!(tagged["last_reading_timestamp"], "2025-03-26T11:00:00Z");

        let untagged = views.iter().find(|v| v["name"] == "Untagged").unwrap();
        assert!(untagged["last_state"].is_null());
    }
}
