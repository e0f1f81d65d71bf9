//! In-process data store
//!
//! Mirrors the constraints of the Postgres schema (unique tenant contact
//! fields, one host per tenant, foreign keys, no overlapping confirmed stays)
//! so workflows behave the same against it. Used for local runs with
//! `database.backend = "memory"` and throughout the test suites.

use crate::db::models::*;
use crate::db::store::*;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::DbErr;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    InsertTenant,
    DeleteTenant,
    InsertCredential,
    InsertHost,
    DeleteHost,
    InsertProperty,
    CheckConflict,
    InsertBooking,
    DeleteBooking,
    InsertPayment,
    InsertPaymentMethod,
    InsertReview,
}

#[derive(Default)]
struct Tables {
    tenants: BTreeMap<Uuid, Tenant>,
    credentials: BTreeMap<Uuid, Credential>,
    hosts: BTreeMap<i64, PropertyOwner>,
    properties: BTreeMap<i64, Property>,
    bookings: BTreeMap<i64, Booking>,
    payments: BTreeMap<i64, Payment>,
    payment_methods: BTreeMap<i64, PaymentMethod>,
    reviews: BTreeMap<i64, Review>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Data store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failures: RwLock<HashSet<FailurePoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of the given operation fail
    pub async fn fail_on(&self, point: FailurePoint) {
        self.failures.write().await.insert(point);
    }

    /// Stop injecting failures
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    async fn check(&self, point: FailurePoint) -> Result<()> {
        if self.failures.read().await.contains(&point) {
            return Err(AppError::Database(DbErr::Custom(format!(
                "injected failure: {:?}",
                point
            ))));
        }
        Ok(())
    }

    pub async fn tenant_count(&self) -> usize {
        self.tables.read().await.tenants.len()
    }

    pub async fn credential_count(&self) -> usize {
        self.tables.read().await.credentials.len()
    }

    pub async fn host_count(&self) -> usize {
        self.tables.read().await.hosts.len()
    }

    pub async fn property_count(&self) -> usize {
        self.tables.read().await.properties.len()
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.read().await.bookings.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    pub async fn payment_method_count(&self) -> usize {
        self.tables.read().await.payment_methods.len()
    }
}

fn foreign_key(message: &str) -> AppError {
    AppError::Database(DbErr::Custom(format!(
        "violates foreign key constraint: {}",
        message
    )))
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant> {
        self.check(FailurePoint::InsertTenant).await?;
        let mut tables = self.tables.write().await;

        let clash = tables.tenants.values().any(|t| {
            t.id == tenant.id
                || t.email == tenant.email
                || t.phone == tenant.phone
                || t.address == tenant.address
        });
        if clash {
            return Err(AppError::Duplicate {
                message: DUPLICATE_TENANT_MESSAGE.to_string(),
            });
        }

        let row = Tenant {
            id: tenant.id,
            name: tenant.name,
            email: tenant.email,
            phone: tenant.phone,
            address: tenant.address,
            date_of_birth: tenant.date_of_birth,
            verification_id: tenant.verification_id,
            created_at: Utc::now().into(),
        };
        tables.tenants.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        Ok(self.tables.read().await.tenants.get(&id).cloned())
    }

    async fn find_tenant_by_email(&self, email: &str) -> Result<Option<Tenant>> {
        let tables = self.tables.read().await;
        Ok(tables.tenants.values().find(|t| t.email == email).cloned())
    }

    async fn delete_tenant(&self, id: Uuid) -> Result<bool> {
        self.check(FailurePoint::DeleteTenant).await?;
        let mut tables = self.tables.write().await;
        // ON DELETE CASCADE
        tables.credentials.remove(&id);
        Ok(tables.tenants.remove(&id).is_some())
    }

    async fn insert_credential(&self, tenant_id: Uuid, password_hash: String) -> Result<Credential> {
        self.check(FailurePoint::InsertCredential).await?;
        let mut tables = self.tables.write().await;

        if !tables.tenants.contains_key(&tenant_id) {
            return Err(foreign_key("credentials.tenant_id"));
        }
        if tables.credentials.contains_key(&tenant_id) {
            return Err(AppError::Duplicate {
                message: "Credential already exists".to_string(),
            });
        }

        let row = Credential {
            tenant_id,
            password_hash,
            created_at: Utc::now().into(),
        };
        tables.credentials.insert(tenant_id, row.clone());
        Ok(row)
    }

    async fn find_credential(&self, tenant_id: Uuid) -> Result<Option<Credential>> {
        Ok(self.tables.read().await.credentials.get(&tenant_id).cloned())
    }

    async fn find_host_by_tenant(&self, tenant_id: Uuid) -> Result<Option<PropertyOwner>> {
        let tables = self.tables.read().await;
        Ok(tables.hosts.values().find(|h| h.tenant_id == tenant_id).cloned())
    }

    async fn insert_host(&self, host: NewPropertyOwner) -> Result<PropertyOwner> {
        self.check(FailurePoint::InsertHost).await?;
        let mut tables = self.tables.write().await;

        if !tables.tenants.contains_key(&host.tenant_id) {
            return Err(foreign_key("property_owners.tenant_id"));
        }
        if tables.hosts.values().any(|h| h.tenant_id == host.tenant_id) {
            return Err(AppError::Duplicate {
                message: "Tenant is already a host".to_string(),
            });
        }

        let row = PropertyOwner {
            id: tables.next_id(),
            tenant_id: host.tenant_id,
            name: host.name,
            email: host.email,
            phone: host.phone,
            address: host.address,
            created_at: Utc::now().into(),
        };
        tables.hosts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_host(&self, id: i64) -> Result<bool> {
        self.check(FailurePoint::DeleteHost).await?;
        let mut tables = self.tables.write().await;

        if tables.properties.values().any(|p| p.owner_id == id) {
            return Err(foreign_key("properties.owner_id"));
        }
        Ok(tables.hosts.remove(&id).is_some())
    }

    async fn insert_property(&self, property: NewProperty) -> Result<Property> {
        self.check(FailurePoint::InsertProperty).await?;
        let mut tables = self.tables.write().await;

        if !tables.hosts.contains_key(&property.owner_id) {
            return Err(foreign_key("properties.owner_id"));
        }

        let d = property.details;
        let row = Property {
            id: tables.next_id(),
            owner_id: property.owner_id,
            address: d.address,
            bedrooms: d.bedrooms,
            bathrooms: d.bathrooms,
            essentials: d.essentials,
            air_conditioners: d.air_conditioners,
            kitchens: d.kitchens,
            heaters: d.heaters,
            washers: d.washers,
            dryers: d.dryers,
            tvs: d.tvs,
            area_sqft: d.area_sqft,
            price_per_night_cents: d.price_per_night_cents,
            image_url: property.image_url,
            created_at: Utc::now().into(),
        };
        tables.properties.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_property(&self, id: i64) -> Result<Option<Property>> {
        Ok(self.tables.read().await.properties.get(&id).cloned())
    }

    async fn list_properties(&self, offset: u64, limit: u64) -> Result<(Vec<Property>, u64)> {
        let tables = self.tables.read().await;
        let total = tables.properties.len() as u64;
        let page = tables
            .properties
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn list_properties_by_owner(&self, owner_id: i64) -> Result<Vec<Property>> {
        let tables = self.tables.read().await;
        Ok(tables
            .properties
            .values()
            .rev()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn check_booking_conflict(
        &self,
        property_id: i64,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool> {
        self.check(FailurePoint::CheckConflict).await?;
        let tables = self.tables.read().await;
        Ok(tables.bookings.values().any(|b| {
            b.property_id == property_id
                && b.booking_status() == BookingStatus::Confirmed
                && b.overlaps(check_in, check_out)
        }))
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking> {
        self.check(FailurePoint::InsertBooking).await?;
        let mut tables = self.tables.write().await;

        if !tables.properties.contains_key(&booking.property_id) {
            return Err(foreign_key("bookings.property_id"));
        }
        if !tables.tenants.contains_key(&booking.tenant_id) {
            return Err(foreign_key("bookings.tenant_id"));
        }
        // bookings_no_overlap exclusion constraint
        if booking.status == BookingStatus::Confirmed
            && tables.bookings.values().any(|b| {
                b.property_id == booking.property_id
                    && b.booking_status() == BookingStatus::Confirmed
                    && b.overlaps(booking.check_in, booking.check_out)
            })
        {
            return Err(AppError::Unavailable {
                property_id: booking.property_id,
            });
        }

        let row = Booking {
            id: tables.next_id(),
            property_id: booking.property_id,
            tenant_id: booking.tenant_id,
            check_in: booking.check_in,
            check_out: booking.check_out,
            guests: booking.guests,
            total_price_cents: booking.total_price_cents,
            status: booking.status.into(),
            special_requests: booking.special_requests,
            created_at: Utc::now().into(),
        };
        tables.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_booking(&self, id: i64) -> Result<bool> {
        self.check(FailurePoint::DeleteBooking).await?;
        let mut tables = self.tables.write().await;

        if tables.payments.values().any(|p| p.booking_id == id) {
            return Err(foreign_key("payments.booking_id"));
        }
        Ok(tables.bookings.remove(&id).is_some())
    }

    async fn find_booking_for_tenant(&self, id: i64, tenant_id: Uuid) -> Result<Option<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .get(&id)
            .filter(|b| b.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_bookings_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .rev()
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_payment(&self, booking_id: i64, amount_cents: i64) -> Result<Payment> {
        self.check(FailurePoint::InsertPayment).await?;
        let mut tables = self.tables.write().await;

        if !tables.bookings.contains_key(&booking_id) {
            return Err(foreign_key("payments.booking_id"));
        }
        if tables.payments.values().any(|p| p.booking_id == booking_id) {
            return Err(AppError::Duplicate {
                message: "Booking already has a payment".to_string(),
            });
        }

        let row = Payment {
            id: tables.next_id(),
            booking_id,
            amount_cents,
            paid_at: Utc::now().into(),
        };
        tables.payments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_payment_by_booking(&self, booking_id: i64) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.booking_id == booking_id)
            .cloned())
    }

    async fn insert_payment_method(&self, method: NewPaymentMethod) -> Result<PaymentMethod> {
        self.check(FailurePoint::InsertPaymentMethod).await?;
        let mut tables = self.tables.write().await;

        if !tables.tenants.contains_key(&method.tenant_id) {
            return Err(foreign_key("payment_methods.tenant_id"));
        }

        let row = PaymentMethod {
            id: tables.next_id(),
            tenant_id: method.tenant_id,
            kind: method.kind,
            card_number: method.card_number,
            expiry: method.expiry,
            first_name: method.first_name,
            last_name: method.last_name,
            created_at: Utc::now().into(),
        };
        tables.payment_methods.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_payment_method(&self, id: i64, tenant_id: Uuid) -> Result<Option<PaymentMethod>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_methods
            .get(&id)
            .filter(|m| m.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_payment_methods(&self, tenant_id: Uuid) -> Result<Vec<PaymentMethod>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_methods
            .values()
            .filter(|m| m.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_review(&self, review: NewReview) -> Result<Review> {
        self.check(FailurePoint::InsertReview).await?;
        let mut tables = self.tables.write().await;

        if !tables.properties.contains_key(&review.property_id) {
            return Err(foreign_key("reviews.property_id"));
        }

        let row = Review {
            id: tables.next_id(),
            property_id: review.property_id,
            stars: review.stars,
            body: review.body,
            created_at: Utc::now().into(),
        };
        tables.reviews.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_reviews(&self, property_id: i64) -> Result<Vec<Review>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .rev()
            .filter(|r| r.property_id == property_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_tenant(email: &str, phone: &str, address: &str) -> NewTenant {
        NewTenant {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            address: address.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            verification_id: "D1234567".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unique_tenant_fields() {
        let store = MemoryStore::new();
        store.insert_tenant(new_tenant("a@b.com", "555-0100", "1 Main St")).await.unwrap();

        let err = store
            .insert_tenant(new_tenant("c@d.com", "555-0100", "2 Main St"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));
        assert_eq!(store.tenant_count().await, 1);
    }

    #[tokio::test]
    async fn test_credential_requires_tenant_and_cascades() {
        let store = MemoryStore::new();
        let orphan = store.insert_credential(Uuid::new_v4(), "hash".into()).await;
        assert!(orphan.is_err());

        let tenant = store.insert_tenant(new_tenant("a@b.com", "1", "x")).await.unwrap();
        store.insert_credential(tenant.id, "hash".into()).await.unwrap();
        assert!(store.delete_tenant(tenant.id).await.unwrap());
        assert_eq!(store.credential_count().await, 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.fail_on(FailurePoint::InsertTenant).await;
        assert!(store.insert_tenant(new_tenant("a@b.com", "1", "x")).await.is_err());

        store.clear_failures().await;
        assert!(store.insert_tenant(new_tenant("a@b.com", "1", "x")).await.is_ok());
    }
}
