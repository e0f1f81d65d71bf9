//! SeaORM entity models
//!
//! Database entities for FareInn

mod tenant;
mod credential;
mod property_owner;
mod property;
mod booking;
mod payment;
mod payment_method;
mod review;

pub use tenant::{
    Entity as TenantEntity,
    Model as Tenant,
    ActiveModel as TenantActiveModel,
    Column as TenantColumn,
};

pub use credential::{
    Entity as CredentialEntity,
    Model as Credential,
    ActiveModel as CredentialActiveModel,
    Column as CredentialColumn,
};

pub use property_owner::{
    Entity as PropertyOwnerEntity,
    Model as PropertyOwner,
    ActiveModel as PropertyOwnerActiveModel,
    Column as PropertyOwnerColumn,
};

pub use property::{
    Entity as PropertyEntity,
    Model as Property,
    ActiveModel as PropertyActiveModel,
    Column as PropertyColumn,
};

pub use booking::{
    Entity as BookingEntity,
    Model as Booking,
    ActiveModel as BookingActiveModel,
    Column as BookingColumn,
    BookingStatus,
};

pub use payment::{
    Entity as PaymentEntity,
    Model as Payment,
    ActiveModel as PaymentActiveModel,
    Column as PaymentColumn,
};

pub use payment_method::{
    Entity as PaymentMethodEntity,
    Model as PaymentMethod,
    ActiveModel as PaymentMethodActiveModel,
    Column as PaymentMethodColumn,
};

pub use review::{
    Entity as ReviewEntity,
    Model as Review,
    ActiveModel as ReviewActiveModel,
    Column as ReviewColumn,
};
