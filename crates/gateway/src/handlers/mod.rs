//! API handlers module

pub mod auth;
pub mod bookings;
pub mod chat;
pub mod dashboard;
pub mod health;
pub mod payment_methods;
pub mod properties;
pub mod reviews;
