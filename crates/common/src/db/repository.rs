//! Repository pattern for database operations
//!
//! SeaORM implementation of [`DataStore`] against the hosted Postgres tables.

use crate::db::models::*;
use crate::db::store::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbBackend, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, RuntimeErr, Set,
    Statement,
};
use uuid::Uuid;

/// SQLSTATE raised by the `bookings_no_overlap` exclusion constraint
const EXCLUSION_VIOLATION: &str = "23P01";

fn is_exclusion_violation(err: &DbErr) -> bool {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(db)))
        | DbErr::Query(RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(db))) => {
            db.code().as_deref() == Some(EXCLUSION_VIOLATION)
        }
        _ => false,
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

#[async_trait]
impl DataStore for Repository {
    // ========================================================================
    // Health Check
    // ========================================================================

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Tenant Operations
    // ========================================================================

    async fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant> {
        let row = TenantActiveModel {
            id: Set(tenant.id),
            name: Set(tenant.name),
            email: Set(tenant.email),
            phone: Set(tenant.phone),
            address: Set(tenant.address),
            date_of_birth: Set(tenant.date_of_birth),
            verification_id: Set(tenant.verification_id),
            created_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn())
            .await
            .map_err(|e| AppError::from_db(e, DUPLICATE_TENANT_MESSAGE))
    }

    async fn find_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        TenantEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_tenant_by_email(&self, email: &str) -> Result<Option<Tenant>> {
        TenantEntity::find()
            .filter(TenantColumn::Email.eq(email))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn delete_tenant(&self, id: Uuid) -> Result<bool> {
        let result = TenantEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Credential Operations
    // ========================================================================

    async fn insert_credential(&self, tenant_id: Uuid, password_hash: String) -> Result<Credential> {
        let row = CredentialActiveModel {
            tenant_id: Set(tenant_id),
            password_hash: Set(password_hash),
            created_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_credential(&self, tenant_id: Uuid) -> Result<Option<Credential>> {
        CredentialEntity::find_by_id(tenant_id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Host Operations
    // ========================================================================

    async fn find_host_by_tenant(&self, tenant_id: Uuid) -> Result<Option<PropertyOwner>> {
        PropertyOwnerEntity::find()
            .filter(PropertyOwnerColumn::TenantId.eq(tenant_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_host(&self, host: NewPropertyOwner) -> Result<PropertyOwner> {
        let row = PropertyOwnerActiveModel {
            id: NotSet,
            tenant_id: Set(host.tenant_id),
            name: Set(host.name),
            email: Set(host.email),
            phone: Set(host.phone),
            address: Set(host.address),
            created_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn())
            .await
            .map_err(|e| AppError::from_db(e, "Tenant is already a host"))
    }

    async fn delete_host(&self, id: i64) -> Result<bool> {
        let result = PropertyOwnerEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Property Operations
    // ========================================================================

    async fn insert_property(&self, property: NewProperty) -> Result<Property> {
        let d = property.details;
        let row = PropertyActiveModel {
            id: NotSet,
            owner_id: Set(property.owner_id),
            address: Set(d.address),
            bedrooms: Set(d.bedrooms),
            bathrooms: Set(d.bathrooms),
            essentials: Set(d.essentials),
            air_conditioners: Set(d.air_conditioners),
            kitchens: Set(d.kitchens),
            heaters: Set(d.heaters),
            washers: Set(d.washers),
            dryers: Set(d.dryers),
            tvs: Set(d.tvs),
            area_sqft: Set(d.area_sqft),
            price_per_night_cents: Set(d.price_per_night_cents),
            image_url: Set(property.image_url),
            created_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_property(&self, id: i64) -> Result<Option<Property>> {
        PropertyEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_properties(&self, offset: u64, limit: u64) -> Result<(Vec<Property>, u64)> {
        let paginator = PropertyEntity::find()
            .order_by_asc(PropertyColumn::Id)
            .paginate(self.read_conn(), limit);

        let total = paginator.num_items().await?;
        let properties = paginator.fetch_page(offset / limit).await?;

        Ok((properties, total))
    }

    async fn list_properties_by_owner(&self, owner_id: i64) -> Result<Vec<Property>> {
        PropertyEntity::find()
            .filter(PropertyColumn::OwnerId.eq(owner_id))
            .order_by_desc(PropertyColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Booking Operations
    // ========================================================================

    async fn check_booking_conflict(
        &self,
        property_id: i64,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool> {
        // Remote procedure defined in migrations/0002_booking_conflict.sql
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT check_booking_conflict($1, $2, $3) AS conflict",
            vec![property_id.into(), check_in.into(), check_out.into()],
        );

        let row = self
            .read_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "check_booking_conflict returned no row".to_string(),
            })?;

        row.try_get_by_index::<bool>(0).map_err(Into::into)
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking> {
        let row = BookingActiveModel {
            id: NotSet,
            property_id: Set(booking.property_id),
            tenant_id: Set(booking.tenant_id),
            check_in: Set(booking.check_in),
            check_out: Set(booking.check_out),
            guests: Set(booking.guests),
            total_price_cents: Set(booking.total_price_cents),
            status: Set(booking.status.into()),
            special_requests: Set(booking.special_requests),
            created_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn()).await.map_err(|e| {
            if is_exclusion_violation(&e) {
                AppError::Unavailable {
                    property_id: booking.property_id,
                }
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn delete_booking(&self, id: i64) -> Result<bool> {
        let result = BookingEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn find_booking_for_tenant(&self, id: i64, tenant_id: Uuid) -> Result<Option<Booking>> {
        BookingEntity::find_by_id(id)
            .filter(BookingColumn::TenantId.eq(tenant_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_bookings_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Booking>> {
        BookingEntity::find()
            .filter(BookingColumn::TenantId.eq(tenant_id))
            .order_by_desc(BookingColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Payment Operations
    // ========================================================================

    async fn insert_payment(&self, booking_id: i64, amount_cents: i64) -> Result<Payment> {
        let row = PaymentActiveModel {
            id: NotSet,
            booking_id: Set(booking_id),
            amount_cents: Set(amount_cents),
            paid_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_payment_by_booking(&self, booking_id: i64) -> Result<Option<Payment>> {
        PaymentEntity::find()
            .filter(PaymentColumn::BookingId.eq(booking_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_payment_method(&self, method: NewPaymentMethod) -> Result<PaymentMethod> {
        let row = PaymentMethodActiveModel {
            id: NotSet,
            tenant_id: Set(method.tenant_id),
            kind: Set(method.kind),
            card_number: Set(method.card_number),
            expiry: Set(method.expiry),
            first_name: Set(method.first_name),
            last_name: Set(method.last_name),
            created_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_payment_method(&self, id: i64, tenant_id: Uuid) -> Result<Option<PaymentMethod>> {
        PaymentMethodEntity::find_by_id(id)
            .filter(PaymentMethodColumn::TenantId.eq(tenant_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_payment_methods(&self, tenant_id: Uuid) -> Result<Vec<PaymentMethod>> {
        PaymentMethodEntity::find()
            .filter(PaymentMethodColumn::TenantId.eq(tenant_id))
            .order_by_asc(PaymentMethodColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Review Operations
    // ========================================================================

    async fn insert_review(&self, review: NewReview) -> Result<Review> {
        let row = ReviewActiveModel {
            id: NotSet,
            property_id: Set(review.property_id),
            stars: Set(review.stars),
            body: Set(review.body),
            created_at: Set(chrono::Utc::now().into()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn list_reviews(&self, property_id: i64) -> Result<Vec<Review>> {
        ReviewEntity::find()
            .filter(ReviewColumn::PropertyId.eq(property_id))
            .order_by_desc(ReviewColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
