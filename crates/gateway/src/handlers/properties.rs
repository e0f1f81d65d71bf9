//! Property catalogue, listing creation and booking quotes

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use fareinn_common::{
    auth::SessionContext,
    db::{Property, PropertyDetails},
    errors::{AppError, Result},
    workflows::{self, ImageUpload, ListingRequest, ListingResult, Quote},
};

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PageQuery {
    /// 1-based page and clamped page size
    fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        (page, per_page)
    }
}

#[derive(Serialize)]
pub struct PropertyPage {
    pub properties: Vec<PropertyView>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// A property with its nightly price rendered for display
#[derive(Serialize)]
pub struct PropertyView {
    #[serde(flatten)]
    pub property: Property,
    pub price_display: String,
}

impl From<Property> for PropertyView {
    fn from(property: Property) -> Self {
        Self {
            price_display: workflows::format_cents(property.price_per_night_cents),
            property,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

pub async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PropertyPage>> {
    let (page, per_page) = query.resolve();
    let offset = (page - 1).saturating_mul(per_page);

    let (properties, total) = state.services.store.list_properties(offset, per_page).await?;

    Ok(Json(PropertyPage {
        properties: properties.into_iter().map(PropertyView::from).collect(),
        page,
        per_page,
        total,
        total_pages: total.div_ceil(per_page),
    }))
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PropertyView>> {
    let property = state
        .services
        .store
        .find_property(id)
        .await?
        .ok_or_else(|| AppError::not_found("Property", id))?;

    Ok(Json(property.into()))
}

/// Price a stay and report whether the dates are free
pub async fn quote(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<Quote>> {
    let today = Utc::now().date_naive();
    let quote = workflows::quote(&state.services, id, query.check_in, query.check_out, today).await?;
    Ok(Json(quote))
}

/// Publish a listing from a multipart form: the property fields as text
/// parts plus an optional `image` file part
pub async fn create_listing(
    State(state): State<AppState>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ListingResult>)> {
    let request = read_listing_form(multipart, state.config.server.max_upload_bytes).await?;
    let result = workflows::create_listing(&state.services, session.tenant_id, request).await?;

    tracing::info!(
        property_id = result.property.id,
        tenant_id = %session.tenant_id,
        request_id = %session.request_id,
        "Listing created via API"
    );

    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Default)]
struct ListingForm {
    address: Option<String>,
    bedrooms: Option<i32>,
    bathrooms: Option<i32>,
    essentials: i32,
    air_conditioners: i32,
    kitchens: i32,
    heaters: i32,
    washers: i32,
    dryers: i32,
    tvs: i32,
    area_sqft: Option<i32>,
    price_per_night_cents: Option<i64>,
    image: Option<ImageUpload>,
}

impl ListingForm {
    fn into_request(self) -> Result<ListingRequest> {
        fn required<T>(value: Option<T>, field: &str) -> Result<T> {
            value.ok_or_else(|| AppError::MissingField {
                field: field.to_string(),
            })
        }

        Ok(ListingRequest {
            details: PropertyDetails {
                address: required(self.address, "address")?,
                bedrooms: required(self.bedrooms, "bedrooms")?,
                bathrooms: required(self.bathrooms, "bathrooms")?,
                essentials: self.essentials,
                air_conditioners: self.air_conditioners,
                kitchens: self.kitchens,
                heaters: self.heaters,
                washers: self.washers,
                dryers: self.dryers,
                tvs: self.tvs,
                area_sqft: required(self.area_sqft, "area_sqft")?,
                price_per_night_cents: required(self.price_per_night_cents, "price_per_night")?,
            },
            image: self.image,
        })
    }
}

async fn read_listing_form(mut multipart: Multipart, upload_limit: usize) -> Result<ListingRequest> {
    let mut form = ListingForm::default();
    let form_error = |e: MultipartError| multipart_error(e, upload_limit);

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" {
            let file_name = field.file_name().unwrap_or("image").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(form_error)?;
            // Browsers send an empty part when no file was chosen
            if !bytes.is_empty() {
                form.image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field.text().await.map_err(form_error)?;
        let value = value.trim();
        match name.as_str() {
            "address" => form.address = Some(value.to_string()),
            "bedrooms" => form.bedrooms = Some(parse_count(&name, value)?),
            "bathrooms" => form.bathrooms = Some(parse_count(&name, value)?),
            "essentials" => form.essentials = parse_count(&name, value)?,
            "air_conditioners" => form.air_conditioners = parse_count(&name, value)?,
            "kitchens" => form.kitchens = parse_count(&name, value)?,
            "heaters" => form.heaters = parse_count(&name, value)?,
            "washers" => form.washers = parse_count(&name, value)?,
            "dryers" => form.dryers = parse_count(&name, value)?,
            "tvs" => form.tvs = parse_count(&name, value)?,
            "area_sqft" => form.area_sqft = Some(parse_count(&name, value)?),
            "price_per_night" => form.price_per_night_cents = Some(parse_dollars(value)?),
            other => tracing::debug!(field = other, "Ignoring unknown listing field"),
        }
    }

    form.into_request()
}

fn multipart_error(e: MultipartError, upload_limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge {
            limit: upload_limit,
        };
    }
    AppError::validation(format!("Invalid listing form: {}", e))
}

fn parse_count(field: &str, value: &str) -> Result<i32> {
    value.parse().map_err(|_| AppError::Validation {
        message: format!("{} must be a whole number", field),
        field: Some(field.to_string()),
    })
}

/// Parse a non-negative dollar amount such as `200`, `200.5` or `200.50` into cents
pub fn parse_dollars(value: &str) -> Result<i64> {
    let invalid = || AppError::Validation {
        message: "Price per night must be a dollar amount".to_string(),
        field: Some("price_per_night".to_string()),
    };

    let value = value.strip_prefix('$').unwrap_or(value);
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty()
        || !whole.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > 2
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let dollars: i64 = whole.parse().map_err(|_| invalid())?;
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };

    dollars
        .checked_mul(100)
        .and_then(|d| d.checked_add(cents))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app, app_with, listed, multipart, send, send_bytes, signed_up};
    use fareinn_common::AppConfig;
    use chrono::Duration;
    use fareinn_common::db::FailurePoint;

    #[test]
    fn test_parse_dollars() {
        assert_eq!(parse_dollars("200").unwrap(), 20000);
        assert_eq!(parse_dollars("$200.5").unwrap(), 20050);
        assert_eq!(parse_dollars("0.99").unwrap(), 99);
        assert!(parse_dollars("").is_err());
        assert!(parse_dollars("1.234").is_err());
        assert!(parse_dollars("abc").is_err());
        // Signs are never accepted, so "-0.50" cannot sneak through as 50 cents
        assert!(parse_dollars("-0.50").is_err());
        assert!(parse_dollars("-1.50").is_err());
        assert!(parse_dollars("-1").is_err());
        assert!(parse_dollars("+5").is_err());
        assert!(parse_dollars("$-0.99").is_err());
    }

    #[test]
    fn test_page_query_bounds() {
        let q = PageQuery { page: Some(0), per_page: Some(500) };
        assert_eq!(q.resolve(), (1, 50));
        assert_eq!(PageQuery::default().resolve(), (1, 20));
    }

    #[tokio::test]
    async fn test_listing_then_catalogue() {
        let (app, _) = app();
        let token = signed_up(&app, 1).await;
        let id = listed(&app, &token, "12 Harbour Rd", "200").await;

        let (status, body) = send(&app, "GET", "/api/v1/properties?per_page=1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["properties"][0]["id"], id);
        assert_eq!(body["properties"][0]["price_display"], "$200.00");

        let (status, body) =
            send(&app, "GET", &format!("/api/v1/properties/{}", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "12 Harbour Rd");
        assert!(body["image_url"].as_str().unwrap().starts_with("memory://"));
    }

    #[tokio::test]
    async fn test_second_listing_reuses_host() {
        let (app, store) = app();
        let token = signed_up(&app, 2).await;
        listed(&app, &token, "1 First St", "100").await;
        listed(&app, &token, "2 Second St", "100").await;

        assert_eq!(store.host_count().await, 1);
        assert_eq!(store.property_count().await, 2);
    }

    #[tokio::test]
    async fn test_listing_rollback_removes_new_host() {
        let (app, store) = app();
        let token = signed_up(&app, 3).await;
        store.fail_on(FailurePoint::InsertProperty).await;

        let (content_type, body) = multipart(
            &[
                ("address", "3 Third St"),
                ("bedrooms", "1"),
                ("bathrooms", "1"),
                ("area_sqft", "400"),
                ("price_per_night", "80"),
            ],
            None,
        );
        let (status, _) =
            send_bytes(&app, "POST", "/api/v1/properties", Some(&token), Some(content_type), body)
                .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.host_count().await, 0);
        assert_eq!(store.property_count().await, 0);
    }

    #[tokio::test]
    async fn test_listing_missing_field() {
        let (app, _) = app();
        let token = signed_up(&app, 4).await;
        let (content_type, body) = multipart(&[("address", "4 Fourth St")], None);

        let (status, json) =
            send_bytes(&app, "POST", "/api/v1/properties", Some(&token), Some(content_type), body)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["field"], "bedrooms");
    }

    #[tokio::test]
    async fn test_oversized_image_is_payload_too_large() {
        let mut config = AppConfig::in_memory();
        config.server.max_upload_bytes = 1024;
        let (app, store) = app_with(config);
        let token = signed_up(&app, 7).await;

        let image = vec![0u8; 8 * 1024];
        let (content_type, body) = multipart(
            &[
                ("address", "7 Heavy St"),
                ("bedrooms", "1"),
                ("bathrooms", "1"),
                ("area_sqft", "400"),
                ("price_per_night", "80"),
            ],
            Some(("huge.png", &image[..])),
        );
        let (status, json) =
            send_bytes(&app, "POST", "/api/v1/properties", Some(&token), Some(content_type), body)
                .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{}", json);
        assert_eq!(store.property_count().await, 0);
    }

    #[tokio::test]
    async fn test_listing_requires_session() {
        let (app, _) = app();
        let (content_type, body) = multipart(&[("address", "5 Fifth St")], None);

        let (status, _) =
            send_bytes(&app, "POST", "/api/v1/properties", None, Some(content_type), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_property() {
        let (app, _) = app();
        let (status, _) = send(&app, "GET", "/api/v1/properties/999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_quote() {
        let (app, _) = app();
        let token = signed_up(&app, 6).await;
        let id = listed(&app, &token, "6 Sixth St", "200").await;

        let check_in = Utc::now().date_naive() + Duration::days(10);
        let check_out = check_in + Duration::days(3);
        let (status, body) = send(
            &app,
            "GET",
            &format!(
                "/api/v1/properties/{}/quote?check_in={}&check_out={}",
                id, check_in, check_out
            ),
            None,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nights"], 3);
        assert_eq!(body["total_cents"], 60000);
        assert_eq!(body["total_display"], "$600.00");
        assert_eq!(body["available"], true);
    }
}
