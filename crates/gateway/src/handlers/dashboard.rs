//! Tenant dashboard

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use fareinn_common::{
    auth::SessionContext,
    db::{Booking, Property, PropertyOwner, Tenant},
    errors::{AppError, Result},
};

#[derive(Serialize)]
pub struct DashboardResponse {
    pub tenant: Tenant,
    pub host: Option<PropertyOwner>,
    pub listings: Vec<Property>,
    pub bookings: Vec<Booking>,
}

/// Profile, host record, listings and bookings of the caller
pub async fn dashboard(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<DashboardResponse>> {
    let store = &state.services.store;

    let (tenant, host, bookings) = futures::try_join!(
        store.find_tenant(session.tenant_id),
        store.find_host_by_tenant(session.tenant_id),
        store.list_bookings_for_tenant(session.tenant_id),
    )?;

    let tenant = tenant.ok_or_else(|| AppError::NotFound {
        resource_type: "User profile".to_string(),
        id: session.tenant_id.to_string(),
    })?;

    let listings = match &host {
        Some(host) => store.list_properties_by_owner(host.id).await?,
        None => Vec::new(),
    };

    Ok(Json(DashboardResponse {
        tenant,
        host,
        listings,
        bookings,
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{app, listed, send, signed_up};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_dashboard_before_and_after_listing() {
        let (app, _) = app();
        let token = signed_up(&app, 1).await;

        let (status, body) = send(&app, "GET", "/api/v1/dashboard", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["host"].is_null());
        assert!(body["listings"].as_array().unwrap().is_empty());

        listed(&app, &token, "8 Dash St", "75").await;

        let (_, body) = send(&app, "GET", "/api/v1/dashboard", Some(&token), None).await;
        assert_eq!(body["host"]["email"], "tenant1@example.com");
        assert_eq!(body["listings"][0]["address"], "8 Dash St");
    }
}
