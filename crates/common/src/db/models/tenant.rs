//! Tenant entity
//!
//! A registered user. The primary key is the identity provider's user id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text", unique)]
    pub email: String,

    #[sea_orm(column_type = "Text", unique)]
    pub phone: String,

    #[sea_orm(column_type = "Text", unique)]
    pub address: String,

    pub date_of_birth: Date,

    #[sea_orm(column_type = "Text")]
    pub verification_id: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::credential::Entity")]
    Credential,

    #[sea_orm(has_one = "super::property_owner::Entity")]
    PropertyOwner,

    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,

    #[sea_orm(has_many = "super::payment_method::Entity")]
    PaymentMethods,
}

impl Related<super::credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Credential.def()
    }
}

impl Related<super::property_owner::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PropertyOwner.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::payment_method::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentMethods.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
