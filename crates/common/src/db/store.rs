//! Data store abstraction
//!
//! Every row-level operation the workflows and read views issue against the
//! hosted backend. `Repository` implements it over SeaORM; `MemoryStore`
//! implements it in-process for local runs and tests.

use crate::db::models::*;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Message reported when a tenant's unique contact fields collide
pub const DUPLICATE_TENANT_MESSAGE: &str = "Email, phone, or address already exists";

/// Tenant row to insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTenant {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub date_of_birth: NaiveDate,
    pub verification_id: String,
}

/// Host row to insert, copied from a tenant
#[derive(Debug, Clone)]
pub struct NewPropertyOwner {
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl From<&Tenant> for NewPropertyOwner {
    fn from(tenant: &Tenant) -> Self {
        Self {
            tenant_id: tenant.id,
            name: tenant.name.clone(),
            email: tenant.email.clone(),
            phone: tenant.phone.clone(),
            address: tenant.address.clone(),
        }
    }
}

/// Structural attributes of a listing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PropertyDetails {
    #[validate(length(max = 500))]
    pub address: String,
    #[validate(range(min = 0, max = 100))]
    pub bedrooms: i32,
    #[validate(range(min = 0, max = 100))]
    pub bathrooms: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub essentials: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub air_conditioners: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub kitchens: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub heaters: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub washers: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub dryers: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub tvs: i32,
    #[validate(range(min = 1))]
    pub area_sqft: i32,
    #[validate(range(min = 1))]
    pub price_per_night_cents: i64,
}

/// Property row to insert
#[derive(Debug, Clone)]
pub struct NewProperty {
    pub owner_id: i64,
    pub image_url: String,
    pub details: PropertyDetails,
}

/// Booking row to insert
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub property_id: i64,
    pub tenant_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub total_price_cents: i64,
    pub status: BookingStatus,
    pub special_requests: Option<String>,
}

/// Saved payment method row to insert
#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub tenant_id: Uuid,
    pub kind: String,
    pub card_number: String,
    pub expiry: String,
    pub first_name: String,
    pub last_name: String,
}

/// Review row to insert
#[derive(Debug, Clone)]
pub struct NewReview {
    pub property_id: i64,
    pub stars: i32,
    pub body: String,
}

/// Trait for data access against the hosted tables
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    // Tenants
    async fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant>;
    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>>;
    async fn find_tenant_by_email(&self, email: &str) -> Result<Option<Tenant>>;
    async fn delete_tenant(&self, id: Uuid) -> Result<bool>;

    // Credentials
    async fn insert_credential(&self, tenant_id: Uuid, password_hash: String) -> Result<Credential>;
    async fn find_credential(&self, tenant_id: Uuid) -> Result<Option<Credential>>;

    // Hosts
    async fn find_host_by_tenant(&self, tenant_id: Uuid) -> Result<Option<PropertyOwner>>;
    async fn insert_host(&self, host: NewPropertyOwner) -> Result<PropertyOwner>;
    async fn delete_host(&self, id: i64) -> Result<bool>;

    // Properties
    async fn insert_property(&self, property: NewProperty) -> Result<Property>;
    async fn find_property(&self, id: i64) -> Result<Option<Property>>;
    async fn list_properties(&self, offset: u64, limit: u64) -> Result<(Vec<Property>, u64)>;
    async fn list_properties_by_owner(&self, owner_id: i64) -> Result<Vec<Property>>;

    // Bookings
    /// Whether any confirmed booking for the property overlaps [check_in, check_out)
    async fn check_booking_conflict(
        &self,
        property_id: i64,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool>;
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking>;
    async fn delete_booking(&self, id: i64) -> Result<bool>;
    async fn find_booking_for_tenant(&self, id: i64, tenant_id: Uuid) -> Result<Option<Booking>>;
    async fn list_bookings_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Booking>>;

    // Payments
    async fn insert_payment(&self, booking_id: i64, amount_cents: i64) -> Result<Payment>;
    async fn find_payment_by_booking(&self, booking_id: i64) -> Result<Option<Payment>>;

    // Payment methods
    async fn insert_payment_method(&self, method: NewPaymentMethod) -> Result<PaymentMethod>;
    async fn find_payment_method(&self, id: i64, tenant_id: Uuid) -> Result<Option<PaymentMethod>>;
    async fn list_payment_methods(&self, tenant_id: Uuid) -> Result<Vec<PaymentMethod>>;

    // Reviews
    async fn insert_review(&self, review: NewReview) -> Result<Review>;
    async fn list_reviews(&self, property_id: i64) -> Result<Vec<Review>>;
}
