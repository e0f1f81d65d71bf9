//! Booking and payment
//!
//! Date validation and the availability check run before any write. The
//! writes then run as a saga: optional saved card → confirmed booking →
//! payment. A failed payment insert deletes the booking again.

use crate::config::AvailabilityPolicy;
use crate::db::{
    Booking, BookingStatus, DataStore, NewBooking, NewPaymentMethod, Payment, Property,
};
use crate::errors::{AppError, Result};
use crate::metrics::record_availability;
use crate::saga::{Saga, SagaStep};
use crate::workflows::Services;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Render integer cents as dollars, e.g. `20000` → `$200.00`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

/// Check the stay dates and return the number of nights
pub fn validate_dates(check_in: NaiveDate, check_out: NaiveDate, today: NaiveDate) -> Result<i64> {
    if check_in < today {
        return Err(AppError::Validation {
            message: "Check-in date must be today or later".to_string(),
            field: Some("check_in".to_string()),
        });
    }

    if check_out <= check_in {
        return Err(AppError::Validation {
            message: "Check-out date must be after check-in date".to_string(),
            field: Some("check_out".to_string()),
        });
    }

    let nights = (check_out - check_in).num_days();
    if nights <= 0 {
        return Err(AppError::validation("Please select valid dates"));
    }
    Ok(nights)
}

fn total_for(property: &Property, nights: i64) -> Result<i64> {
    property
        .price_per_night_cents
        .checked_mul(nights)
        .ok_or_else(|| AppError::validation("Stay is too long to price"))
}

/// Whether the property is free for [check_in, check_out), applying the
/// configured policy when the check itself fails
pub async fn is_available(
    services: &Services,
    property_id: i64,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> Result<bool> {
    match services
        .store
        .check_booking_conflict(property_id, check_in, check_out)
        .await
    {
        Ok(conflict) => {
            record_availability(if conflict { "conflict" } else { "available" });
            Ok(!conflict)
        }
        Err(e) => match services.workflow.availability_policy {
            AvailabilityPolicy::FailOpen => {
                tracing::warn!(
                    property_id,
                    %check_in,
                    %check_out,
                    error = %e,
                    "Availability check failed, assuming available"
                );
                record_availability("fail_open");
                Ok(true)
            }
            AvailabilityPolicy::FailClosed => {
                tracing::error!(property_id, error = %e, "Availability check failed");
                record_availability("fail_closed");
                Err(AppError::ServiceUnavailable {
                    message: "Availability check failed, please try again".to_string(),
                })
            }
        },
    }
}

/// Price and availability for a stay
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub property_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i64,
    pub price_per_night_cents: i64,
    pub total_cents: i64,
    pub total_display: String,
    pub available: bool,
}

/// Price a stay without writing anything
pub async fn quote(
    services: &Services,
    property_id: i64,
    check_in: NaiveDate,
    check_out: NaiveDate,
    today: NaiveDate,
) -> Result<Quote> {
    let nights = validate_dates(check_in, check_out, today)?;
    let property = load_property(services, property_id).await?;
    let total_cents = total_for(&property, nights)?;
    let available = is_available(services, property_id, check_in, check_out).await?;

    Ok(Quote {
        property_id,
        check_in,
        check_out,
        nights,
        price_per_night_cents: property.price_per_night_cents,
        total_cents,
        total_display: format_cents(total_cents),
        available,
    })
}

async fn load_property(services: &Services, property_id: i64) -> Result<Property> {
    services
        .store
        .find_property(property_id)
        .await?
        .ok_or_else(|| AppError::not_found("Property", property_id))
}

/// Manually entered card. Stored as provided when saving is requested; the
/// CVV is checked for presence and then dropped.
#[derive(Clone, Deserialize, Validate)]
pub struct CardDetails {
    #[validate(length(min = 1, max = 50))]
    pub kind: String,
    #[validate(length(min = 12, max = 23))]
    pub card_number: String,
    #[validate(length(min = 4, max = 7))]
    pub expiry: String,
    #[validate(length(min = 3, max = 4))]
    pub cvv: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars: Vec<char> = self.card_number.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        f.debug_struct("CardDetails")
            .field("kind", &self.kind)
            .field("card_number", &format!("****{}", tail))
            .field("cvv", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// How the stay is paid
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentChoice {
    /// A payment method saved earlier by the same tenant
    Saved { payment_method_id: i64 },
    /// A card entered at checkout, optionally saved for later
    Card {
        card: CardDetails,
        #[serde(default)]
        save: bool,
    },
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookingRequest {
    pub property_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[validate(range(min = 1, max = 50))]
    pub guests: i32,
    #[validate(length(max = 1000))]
    pub special_requests: Option<String>,
    pub payment: PaymentChoice,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingResult {
    pub booking: Booking,
    pub payment: Payment,
    pub payment_method_id: Option<i64>,
    pub total_display: String,
}

struct BookingContext {
    tenant_id: Uuid,
    property_id: i64,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: i32,
    total_cents: i64,
    special_requests: Option<String>,
    card_to_save: Option<CardDetails>,
    payment_method_id: Option<i64>,
    booking: Option<Booking>,
    payment: Option<Payment>,
}

struct SavePaymentMethod {
    store: Arc<dyn DataStore>,
}

#[async_trait]
impl SagaStep<BookingContext> for SavePaymentMethod {
    fn name(&self) -> &'static str {
        "save_payment_method"
    }

    // Kept on later failure: saving was a separate choice of the tenant
    async fn execute(&self, ctx: &mut BookingContext) -> Result<()> {
        let Some(card) = ctx.card_to_save.take() else {
            return Ok(());
        };

        let method = self
            .store
            .insert_payment_method(NewPaymentMethod {
                tenant_id: ctx.tenant_id,
                kind: card.kind,
                card_number: card.card_number,
                expiry: card.expiry,
                first_name: card.first_name,
                last_name: card.last_name,
            })
            .await?;

        tracing::info!(tenant_id = %ctx.tenant_id, payment_method_id = method.id, "Payment method saved");
        ctx.payment_method_id = Some(method.id);
        Ok(())
    }
}

struct InsertBooking {
    store: Arc<dyn DataStore>,
}

#[async_trait]
impl SagaStep<BookingContext> for InsertBooking {
    fn name(&self) -> &'static str {
        "insert_booking"
    }

    async fn execute(&self, ctx: &mut BookingContext) -> Result<()> {
        let booking = self
            .store
            .insert_booking(NewBooking {
                property_id: ctx.property_id,
                tenant_id: ctx.tenant_id,
                check_in: ctx.check_in,
                check_out: ctx.check_out,
                guests: ctx.guests,
                total_price_cents: ctx.total_cents,
                status: BookingStatus::Confirmed,
                special_requests: ctx.special_requests.clone(),
            })
            .await?;

        tracing::info!(booking_id = booking.id, property_id = ctx.property_id, "Booking confirmed");
        ctx.booking = Some(booking);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut BookingContext) -> Result<()> {
        if let Some(booking) = &ctx.booking {
            self.store.delete_booking(booking.id).await?;
            tracing::warn!(booking_id = booking.id, "Booking rolled back");
        }
        Ok(())
    }
}

struct InsertPayment {
    store: Arc<dyn DataStore>,
}

#[async_trait]
impl SagaStep<BookingContext> for InsertPayment {
    fn name(&self) -> &'static str {
        "insert_payment"
    }

    async fn execute(&self, ctx: &mut BookingContext) -> Result<()> {
        let booking = ctx.booking.as_ref().ok_or_else(|| AppError::Internal {
            message: "booking missing from booking context".to_string(),
        })?;

        let payment = self
            .store
            .insert_payment(booking.id, booking.total_price_cents)
            .await?;

        ctx.payment = Some(payment);
        Ok(())
    }
}

fn booking_saga(services: &Services) -> Saga<BookingContext> {
    Saga::new("booking")
        .step(SavePaymentMethod {
            store: services.store.clone(),
        })
        .step(InsertBooking {
            store: services.store.clone(),
        })
        .step(InsertPayment {
            store: services.store.clone(),
        })
}

/// Book a stay and record its payment
pub async fn create_booking(
    services: &Services,
    tenant_id: Uuid,
    request: BookingRequest,
    today: NaiveDate,
) -> Result<BookingResult> {
    let nights = validate_dates(request.check_in, request.check_out, today)?;
    request.validate()?;

    let (card_to_save, payment_method_id) = match request.payment {
        PaymentChoice::Saved { payment_method_id } => {
            services
                .store
                .find_payment_method(payment_method_id, tenant_id)
                .await?
                .ok_or_else(|| AppError::Forbidden {
                    message: "Payment method does not belong to this account".to_string(),
                })?;
            (None, Some(payment_method_id))
        }
        PaymentChoice::Card { card, save } => {
            card.validate()?;
            (save.then_some(card), None)
        }
    };

    let property = load_property(services, request.property_id).await?;
    let total_cents = total_for(&property, nights)?;

    if !is_available(services, property.id, request.check_in, request.check_out).await? {
        return Err(AppError::Unavailable {
            property_id: property.id,
        });
    }

    let mut ctx = BookingContext {
        tenant_id,
        property_id: property.id,
        check_in: request.check_in,
        check_out: request.check_out,
        guests: request.guests,
        total_cents,
        special_requests: request
            .special_requests
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        card_to_save,
        payment_method_id,
        booking: None,
        payment: None,
    };

    booking_saga(services).run(&mut ctx).await?;

    match (ctx.booking, ctx.payment) {
        (Some(booking), Some(payment)) => Ok(BookingResult {
            total_display: format_cents(booking.total_price_cents),
            booking,
            payment,
            payment_method_id: ctx.payment_method_id,
        }),
        _ => Err(AppError::Internal {
            message: "booking finished without a payment".to_string(),
        }),
    }
}

/// Confirmation view of a booking
#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    pub booking: Booking,
    pub property: Property,
    pub payment: Option<Payment>,
    pub nights: i64,
    pub total_display: String,
}

/// Load a booking for its own tenant
pub async fn confirmation(
    services: &Services,
    tenant_id: Uuid,
    booking_id: i64,
) -> Result<BookingConfirmation> {
    let booking = services
        .store
        .find_booking_for_tenant(booking_id, tenant_id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking", booking_id))?;

    let (property, payment) = futures::try_join!(
        load_property(services, booking.property_id),
        services.store.find_payment_by_booking(booking.id),
    )?;

    Ok(BookingConfirmation {
        nights: booking.nights(),
        total_display: format_cents(booking.total_price_cents),
        booking,
        property,
        payment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::db::{FailurePoint, NewProperty, NewPropertyOwner, NewTenant, PropertyDetails, Tenant};
    use crate::workflows::testing::Harness;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 5, 1)
    }

    async fn tenant(h: &Harness, n: u32) -> Tenant {
        h.store
            .insert_tenant(NewTenant {
                id: Uuid::new_v4(),
                name: format!("Guest {}", n),
                email: format!("guest{}@example.com", n),
                phone: format!("555-01{:02}", n),
                address: format!("{} Guest Rd", n),
                date_of_birth: date(1990, 1, 1),
                verification_id: format!("ID-{}", n),
            })
            .await
            .unwrap()
    }

    /// Creates properties until the requested id exists, priced at $100/night
    async fn property(h: &Harness, id: i64) -> Property {
        let owner = tenant(h, 99).await;
        let host = h.store.insert_host(NewPropertyOwner::from(&owner)).await.unwrap();
        loop {
            let p = h
                .store
                .insert_property(NewProperty {
                    owner_id: host.id,
                    image_url: "memory://propertyImages/x.png".to_string(),
                    details: PropertyDetails {
                        address: "5 Beach Rd".to_string(),
                        bedrooms: 2,
                        bathrooms: 1,
                        essentials: 0,
                        air_conditioners: 0,
                        kitchens: 1,
                        heaters: 0,
                        washers: 0,
                        dryers: 0,
                        tvs: 0,
                        area_sqft: 700,
                        price_per_night_cents: 10_000,
                    },
                })
                .await
                .unwrap();
            if p.id >= id {
                return p;
            }
        }
    }

    fn card() -> CardDetails {
        CardDetails {
            kind: "visa".to_string(),
            card_number: "4111 1111 1111 1234".to_string(),
            expiry: "12/29".to_string(),
            cvv: "123".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    fn request(property_id: i64, check_in: NaiveDate, check_out: NaiveDate) -> BookingRequest {
        BookingRequest {
            property_id,
            check_in,
            check_out,
            guests: 2,
            special_requests: None,
            payment: PaymentChoice::Card { card: card(), save: false },
        }
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(20_000), "$200.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(-150), "-$1.50");
    }

    #[test]
    fn test_date_validation() {
        let t = today();
        assert_eq!(validate_dates(date(2025, 6, 1), date(2025, 6, 3), t).unwrap(), 2);
        assert_eq!(validate_dates(t, date(2025, 5, 2), t).unwrap(), 1);

        let err = validate_dates(date(2025, 4, 30), date(2025, 5, 2), t).unwrap_err();
        assert_eq!(err.to_string(), "Check-in date must be today or later");

        let err = validate_dates(date(2025, 6, 3), date(2025, 6, 3), t).unwrap_err();
        assert_eq!(err.to_string(), "Check-out date must be after check-in date");
    }

    #[tokio::test]
    async fn test_booking_total_and_confirmation() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;
        let p = property(&h, 5).await;
        assert_eq!(p.id, 5);

        let result = create_booking(
            &h.services,
            guest.id,
            request(5, date(2025, 6, 1), date(2025, 6, 3)),
            today(),
        )
        .await
        .unwrap();

        assert_eq!(result.booking.total_price_cents, 20_000);
        assert_eq!(result.booking.booking_status(), BookingStatus::Confirmed);
        assert_eq!(result.payment.amount_cents, 20_000);
        assert_eq!(result.total_display, "$200.00");

        let view = confirmation(&h.services, guest.id, result.booking.id).await.unwrap();
        assert_eq!(view.total_display, "$200.00");
        assert_eq!(view.nights, 2);
        assert_eq!(view.property.id, 5);
        assert!(view.payment.is_some());
    }

    #[tokio::test]
    async fn test_confirmation_hidden_from_other_tenants() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;
        let other = tenant(&h, 2).await;
        let p = property(&h, 1).await;

        let result = create_booking(
            &h.services,
            guest.id,
            request(p.id, date(2025, 6, 1), date(2025, 6, 3)),
            today(),
        )
        .await
        .unwrap();

        let err = confirmation(&h.services, other.id, result.booking.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_dates_write_nothing() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;
        let p = property(&h, 1).await;

        let past = create_booking(
            &h.services,
            guest.id,
            request(p.id, date(2025, 4, 1), date(2025, 4, 3)),
            today(),
        )
        .await;
        let inverted = create_booking(
            &h.services,
            guest.id,
            request(p.id, date(2025, 6, 3), date(2025, 6, 1)),
            today(),
        )
        .await;

        assert!(past.is_err());
        assert!(inverted.is_err());
        assert_eq!(h.store.booking_count().await, 0);
        assert_eq!(h.store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_overlapping_booking_rejected() {
        let h = Harness::new();
        let first = tenant(&h, 1).await;
        let second = tenant(&h, 2).await;
        let p = property(&h, 1).await;

        create_booking(
            &h.services,
            first.id,
            request(p.id, date(2025, 6, 1), date(2025, 6, 5)),
            today(),
        )
        .await
        .unwrap();

        let err = create_booking(
            &h.services,
            second.id,
            request(p.id, date(2025, 6, 4), date(2025, 6, 8)),
            today(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unavailable { .. }));

        // back-to-back stays share no night
        create_booking(
            &h.services,
            second.id,
            request(p.id, date(2025, 6, 5), date(2025, 6, 8)),
            today(),
        )
        .await
        .unwrap();
        assert_eq!(h.store.booking_count().await, 2);
    }

    #[tokio::test]
    async fn test_availability_check_is_idempotent() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;
        let p = property(&h, 1).await;
        create_booking(
            &h.services,
            guest.id,
            request(p.id, date(2025, 6, 1), date(2025, 6, 5)),
            today(),
        )
        .await
        .unwrap();

        let a = is_available(&h.services, p.id, date(2025, 6, 2), date(2025, 6, 3)).await.unwrap();
        let b = is_available(&h.services, p.id, date(2025, 6, 2), date(2025, 6, 3)).await.unwrap();
        assert!(!a);
        assert_eq!(a, b);

        let c = is_available(&h.services, p.id, date(2025, 7, 1), date(2025, 7, 3)).await.unwrap();
        let d = is_available(&h.services, p.id, date(2025, 7, 1), date(2025, 7, 3)).await.unwrap();
        assert!(c);
        assert_eq!(c, d);
    }

    #[tokio::test]
    async fn test_fail_open_proceeds_when_check_errors() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;
        let p = property(&h, 1).await;
        h.store.fail_on(FailurePoint::CheckConflict).await;

        let result = create_booking(
            &h.services,
            guest.id,
            request(p.id, date(2025, 6, 1), date(2025, 6, 3)),
            today(),
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fail_closed_aborts_when_check_errors() {
        let h = Harness::with_workflow(WorkflowConfig {
            availability_policy: AvailabilityPolicy::FailClosed,
            ..WorkflowConfig::default()
        });
        let guest = tenant(&h, 1).await;
        let p = property(&h, 1).await;
        h.store.fail_on(FailurePoint::CheckConflict).await;

        let err = create_booking(
            &h.services,
            guest.id,
            request(p.id, date(2025, 6, 1), date(2025, 6, 3)),
            today(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::ServiceUnavailable { .. }));
        assert_eq!(h.store.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_fail_open_still_blocked_by_exclusion_constraint() {
        let h = Harness::new();
        let first = tenant(&h, 1).await;
        let second = tenant(&h, 2).await;
        let p = property(&h, 1).await;
        create_booking(
            &h.services,
            first.id,
            request(p.id, date(2025, 6, 1), date(2025, 6, 5)),
            today(),
        )
        .await
        .unwrap();

        h.store.fail_on(FailurePoint::CheckConflict).await;
        let err = create_booking(
            &h.services,
            second.id,
            request(p.id, date(2025, 6, 2), date(2025, 6, 4)),
            today(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unavailable { .. }));
        assert_eq!(h.store.booking_count().await, 1);
    }

    #[tokio::test]
    async fn test_payment_failure_rolls_back_booking() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;
        let p = property(&h, 1).await;
        h.store.fail_on(FailurePoint::InsertPayment).await;

        let mut req = request(p.id, date(2025, 6, 1), date(2025, 6, 3));
        req.payment = PaymentChoice::Card { card: card(), save: true };

        let result = create_booking(&h.services, guest.id, req, today()).await;

        assert!(result.is_err());
        assert_eq!(h.store.booking_count().await, 0);
        assert_eq!(h.store.payment_count().await, 0);
        // saved card survives the rollback
        assert_eq!(h.store.payment_method_count().await, 1);
    }

    #[tokio::test]
    async fn test_saved_method_must_belong_to_tenant() {
        let h = Harness::new();
        let owner = tenant(&h, 1).await;
        let other = tenant(&h, 2).await;
        let p = property(&h, 1).await;

        let mut req = request(p.id, date(2025, 6, 1), date(2025, 6, 3));
        req.payment = PaymentChoice::Card { card: card(), save: true };
        let saved = create_booking(&h.services, owner.id, req, today())
            .await
            .unwrap()
            .payment_method_id
            .unwrap();

        let mut req = request(p.id, date(2025, 7, 1), date(2025, 7, 3));
        req.payment = PaymentChoice::Saved { payment_method_id: saved };
        let err = create_booking(&h.services, other.id, req.clone(), today())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        let ok = create_booking(&h.services, owner.id, req, today()).await.unwrap();
        assert_eq!(ok.payment_method_id, Some(saved));
    }

    #[tokio::test]
    async fn test_guests_must_be_positive() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;
        let p = property(&h, 1).await;
        let mut req = request(p.id, date(2025, 6, 1), date(2025, 6, 3));
        req.guests = 0;

        let err = create_booking(&h.services, guest.id, req, today()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_property() {
        let h = Harness::new();
        let guest = tenant(&h, 1).await;

        let err = create_booking(
            &h.services,
            guest.id,
            request(42, date(2025, 6, 1), date(2025, 6, 3)),
            today(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Property not found: 42");
    }

    #[tokio::test]
    async fn test_quote() {
        let h = Harness::new();
        let p = property(&h, 1).await;

        let q = quote(&h.services, p.id, date(2025, 6, 1), date(2025, 6, 4), today())
            .await
            .unwrap();
        assert_eq!(q.nights, 3);
        assert_eq!(q.total_cents, 30_000);
        assert_eq!(q.total_display, "$300.00");
        assert!(q.available);
    }

    #[test]
    fn test_card_debug_hides_secrets() {
        let rendered = format!("{:?}", card());
        assert!(!rendered.contains("123\""));
        assert!(!rendered.contains("4111"));
        assert!(rendered.contains("1234"));
    }
}
