//! Property (listing) entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "properties")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub owner_id: i64,

    #[sea_orm(column_type = "Text")]
    pub address: String,

    pub bedrooms: i32,

    pub bathrooms: i32,

    pub essentials: i32,

    pub air_conditioners: i32,

    pub kitchens: i32,

    pub heaters: i32,

    pub washers: i32,

    pub dryers: i32,

    pub tvs: i32,

    /// Floor area in square feet
    pub area_sqft: i32,

    pub price_per_night_cents: i64,

    #[sea_orm(column_type = "Text")]
    pub image_url: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::property_owner::Entity",
        from = "Column::OwnerId",
        to = "super::property_owner::Column::Id"
    )]
    Owner,

    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,

    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
}

impl Related<super::property_owner::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
