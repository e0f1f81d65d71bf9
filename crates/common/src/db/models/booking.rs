//! Booking entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Booking status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Pending,
    Cancelled,
}

impl From<String> for BookingStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Pending,
        }
    }
}

impl From<BookingStatus> for String {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Confirmed => "confirmed".to_string(),
            BookingStatus::Pending => "pending".to_string(),
            BookingStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub property_id: i64,

    pub tenant_id: Uuid,

    pub check_in: Date,

    /// Exclusive end of the stay
    pub check_out: Date,

    pub guests: i32,

    pub total_price_cents: i64,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub special_requests: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the booking status as an enum
    pub fn booking_status(&self) -> BookingStatus {
        BookingStatus::from(self.status.clone())
    }

    /// Number of nights covered by the stay
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Whether this booking's [check_in, check_out) range intersects another range
    pub fn overlaps(&self, check_in: Date, check_out: Date) -> bool {
        self.check_in < check_out && check_in < self.check_out
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::property::Entity",
        from = "Column::PropertyId",
        to = "super::property::Column::Id"
    )]
    Property,

    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,

    #[sea_orm(has_one = "super::payment::Entity")]
    Payment,
}

impl Related<super::property::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Property.def()
    }
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn booking(check_in: NaiveDate, check_out: NaiveDate) -> Model {
        Model {
            id: 1,
            property_id: 5,
            tenant_id: Uuid::new_v4(),
            check_in,
            check_out,
            guests: 2,
            total_price_cents: 20_000,
            status: BookingStatus::Confirmed.into(),
            special_requests: None,
            created_at: Utc::now().into(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_half_open_overlap() {
        let existing = booking(day(1), day(3));
        assert!(existing.overlaps(day(2), day(4)));
        assert!(existing.overlaps(day(1), day(3)));
        // Checking in on the day another guest checks out is fine
        assert!(!existing.overlaps(day(3), day(5)));
        assert!(!existing.overlaps(day(10), day(12)));
    }

    #[test]
    fn test_status_roundtrip_and_nights() {
        let b = booking(day(1), day(3));
        assert_eq!(b.booking_status(), BookingStatus::Confirmed);
        assert_eq!(b.nights(), 2);
        assert_eq!(BookingStatus::from("unknown".to_string()), BookingStatus::Pending);
    }
}
