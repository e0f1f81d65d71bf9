//! Saved payment methods

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use fareinn_common::{auth::SessionContext, db::PaymentMethod, errors::Result};

/// A saved card with everything but the last four digits hidden
#[derive(Serialize)]
pub struct PaymentMethodView {
    pub id: i64,
    pub kind: String,
    pub card_number: String,
    pub expiry: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<PaymentMethod> for PaymentMethodView {
    fn from(method: PaymentMethod) -> Self {
        Self {
            card_number: method.masked_card_number(),
            id: method.id,
            kind: method.kind,
            expiry: method.expiry,
            first_name: method.first_name,
            last_name: method.last_name,
        }
    }
}

#[derive(Serialize)]
pub struct PaymentMethodList {
    pub payment_methods: Vec<PaymentMethodView>,
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<PaymentMethodList>> {
    let methods = state
        .services
        .store
        .list_payment_methods(session.tenant_id)
        .await?;

    Ok(Json(PaymentMethodList {
        payment_methods: methods.into_iter().map(PaymentMethodView::from).collect(),
    }))
}
