//! Booking handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;
use fareinn_common::{
    auth::SessionContext,
    db::Booking,
    errors::Result,
    workflows::{self, BookingConfirmation, BookingRequest, BookingResult},
};

#[derive(Serialize)]
pub struct BookingList {
    pub bookings: Vec<Booking>,
}

/// Book a stay and pay for it
pub async fn create_booking(
    State(state): State<AppState>,
    session: SessionContext,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResult>)> {
    let today = Utc::now().date_naive();
    let result =
        workflows::create_booking(&state.services, session.tenant_id, request, today).await?;

    tracing::info!(
        booking_id = result.booking.id,
        tenant_id = %session.tenant_id,
        request_id = %session.request_id,
        "Booking created via API"
    );

    Ok((StatusCode::CREATED, Json(result)))
}

/// The caller's bookings, newest first
pub async fn my_bookings(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<BookingList>> {
    let bookings = state
        .services
        .store
        .list_bookings_for_tenant(session.tenant_id)
        .await?;

    Ok(Json(BookingList { bookings }))
}

pub async fn get_confirmation(
    State(state): State<AppState>,
    session: SessionContext,
    Path(id): Path<i64>,
) -> Result<Json<BookingConfirmation>> {
    let confirmation = workflows::confirmation(&state.services, session.tenant_id, id).await?;
    Ok(Json(confirmation))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{app, listed, send, signed_up};
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use fareinn_common::db::FailurePoint;
    use serde_json::{json, Value};

    fn card_booking(property_id: i64, offset_days: i64, nights: i64, save: bool) -> Value {
        let check_in = Utc::now().date_naive() + Duration::days(offset_days);
        let check_out = check_in + Duration::days(nights);
        json!({
            "property_id": property_id,
            "check_in": check_in,
            "check_out": check_out,
            "guests": 2,
            "payment": {
                "type": "card",
                "save": save,
                "card": {
                    "kind": "Visa",
                    "card_number": "4242424242424242",
                    "expiry": "12/30",
                    "cvv": "123",
                    "first_name": "Ada",
                    "last_name": "Lovelace"
                }
            }
        })
    }

    #[tokio::test]
    async fn test_book_and_confirm() {
        let (app, _) = app();
        let host = signed_up(&app, 1).await;
        let guest = signed_up(&app, 2).await;
        let property_id = listed(&app, &host, "5 Booking Ave", "200").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/bookings",
            Some(&guest),
            Some(card_booking(property_id, 5, 1, true)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["total_display"], "$200.00");
        assert!(body["payment_method_id"].is_i64());
        let booking_id = body["booking"]["id"].as_i64().unwrap();

        let uri = format!("/api/v1/bookings/{}", booking_id);
        let (status, body) = send(&app, "GET", &uri, Some(&guest), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nights"], 1);
        assert_eq!(body["property"]["address"], "5 Booking Ave");
        assert_eq!(body["payment"]["amount_cents"], 20000);

        // Someone else's booking is invisible
        let (status, _) = send(&app, "GET", &uri, Some(&host), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, "GET", "/api/v1/bookings", Some(&guest), None).await;
        assert_eq!(body["bookings"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, "GET", "/api/v1/payment-methods", Some(&guest), None).await;
        assert_eq!(body["payment_methods"][0]["card_number"], "**** **** **** 4242");
    }

    #[tokio::test]
    async fn test_overlapping_booking_conflicts() {
        let (app, _) = app();
        let host = signed_up(&app, 3).await;
        let guest = signed_up(&app, 4).await;
        let property_id = listed(&app, &host, "7 Busy St", "150").await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/bookings",
            Some(&guest),
            Some(card_booking(property_id, 10, 3, false)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/bookings",
            Some(&guest),
            Some(card_booking(property_id, 11, 1, false)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    }

    #[tokio::test]
    async fn test_payment_failure_rolls_back_booking() {
        let (app, store) = app();
        let host = signed_up(&app, 5).await;
        let guest = signed_up(&app, 6).await;
        let property_id = listed(&app, &host, "9 Fragile Rd", "120").await;
        store.fail_on(FailurePoint::InsertPayment).await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/bookings",
            Some(&guest),
            Some(card_booking(property_id, 3, 2, false)),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.booking_count().await, 0);
        assert_eq!(store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_past_check_in_rejected() {
        let (app, _) = app();
        let host = signed_up(&app, 7).await;
        let property_id = listed(&app, &host, "11 Late Ln", "90").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/bookings",
            Some(&host),
            Some(card_booking(property_id, -2, 1, false)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Check-in date must be today or later");
    }

    #[tokio::test]
    async fn test_booking_requires_session() {
        let (app, _) = app();
        let (status, _) =
            send(&app, "POST", "/api/v1/bookings", None, Some(card_booking(1, 1, 1, false))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
