//! Property reviews

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use fareinn_common::{
    auth::SessionContext,
    db::{NewReview, Review},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5 stars"))]
    pub stars: i32,
    #[validate(length(max = 5000))]
    pub body: String,
}

#[derive(Serialize)]
pub struct ReviewList {
    pub reviews: Vec<Review>,
    pub average_stars: Option<f64>,
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
) -> Result<Json<ReviewList>> {
    let reviews = state.services.store.list_reviews(property_id).await?;

    let average_stars = (!reviews.is_empty()).then(|| {
        let sum: i64 = reviews.iter().map(|r| i64::from(r.stars)).sum();
        sum as f64 / reviews.len() as f64
    });

    Ok(Json(ReviewList {
        reviews,
        average_stars,
    }))
}

pub async fn create_review(
    State(state): State<AppState>,
    session: SessionContext,
    Path(property_id): Path<i64>,
    Json(request): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    request.validate()?;
    let body = request.body.trim();
    if body.is_empty() {
        return Err(AppError::Validation {
            message: "Review text is required".to_string(),
            field: Some("body".to_string()),
        });
    }

    let store = &state.services.store;
    store
        .find_property(property_id)
        .await?
        .ok_or_else(|| AppError::not_found("Property", property_id))?;

    let review = store
        .insert_review(NewReview {
            property_id,
            stars: request.stars,
            body: body.to_string(),
        })
        .await?;

    tracing::info!(
        review_id = review.id,
        property_id,
        tenant_id = %session.tenant_id,
        "Review posted"
    );

    Ok((StatusCode::CREATED, Json(review)))
}
