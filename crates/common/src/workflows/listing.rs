//! New listing publication
//!
//! Ensures the tenant has a host profile, uploads the optional image and
//! inserts the property. A host profile created by this run is deleted again
//! when the property insert fails; an existing one is never touched.

use crate::db::{DataStore, NewProperty, NewPropertyOwner, Property, PropertyDetails, PropertyOwner, Tenant};
use crate::errors::{AppError, Result};
use crate::saga::{Saga, SagaStep};
use crate::storage::{object_key_for_address, ObjectStorage};
use crate::workflows::Services;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// An image file attached to a listing
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ListingRequest {
    pub details: PropertyDetails,
    pub image: Option<ImageUpload>,
}

/// Published property plus non-fatal warnings raised on the way
#[derive(Debug, Clone, Serialize)]
pub struct ListingResult {
    pub property: Property,
    pub host: PropertyOwner,
    pub new_host: bool,
    pub warnings: Vec<String>,
}

struct ListingContext {
    tenant: Tenant,
    details: PropertyDetails,
    image: Option<ImageUpload>,
    default_image_url: String,
    host: Option<PropertyOwner>,
    new_host: bool,
    image_url: Option<String>,
    property: Option<Property>,
    warnings: Vec<String>,
}

struct EnsureHost {
    store: Arc<dyn DataStore>,
}

#[async_trait]
impl SagaStep<ListingContext> for EnsureHost {
    fn name(&self) -> &'static str {
        "ensure_host"
    }

    async fn execute(&self, ctx: &mut ListingContext) -> Result<()> {
        if let Some(host) = self.store.find_host_by_tenant(ctx.tenant.id).await? {
            ctx.host = Some(host);
            return Ok(());
        }

        let host = self
            .store
            .insert_host(NewPropertyOwner::from(&ctx.tenant))
            .await?;

        tracing::info!(tenant_id = %ctx.tenant.id, host_id = host.id, "Tenant promoted to host");
        ctx.host = Some(host);
        ctx.new_host = true;
        Ok(())
    }

    async fn compensate(&self, ctx: &mut ListingContext) -> Result<()> {
        if !ctx.new_host {
            return Ok(());
        }

        if let Some(host) = &ctx.host {
            self.store.delete_host(host.id).await?;
            tracing::warn!(host_id = host.id, "Host profile rolled back");
        }
        Ok(())
    }
}

struct UploadImage {
    storage: Arc<dyn ObjectStorage>,
}

#[async_trait]
impl SagaStep<ListingContext> for UploadImage {
    fn name(&self) -> &'static str {
        "upload_image"
    }

    /// Never fails: any storage error falls back to the default image
    async fn execute(&self, ctx: &mut ListingContext) -> Result<()> {
        let Some(image) = ctx.image.take() else {
            return Ok(());
        };

        let key = object_key_for_address(&ctx.details.address, &image.file_name);
        if let Err(e) = self
            .storage
            .upload(&key, image.bytes, &image.content_type)
            .await
        {
            tracing::warn!(key = %key, error = %e, "Image upload failed, using default image");
            ctx.warnings.push(format!(
                "Image upload failed: {}. Proceeding with default image.",
                e
            ));
            return Ok(());
        }

        match self.storage.public_url(&key) {
            Ok(url) => ctx.image_url = Some(url),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Public image URL unavailable");
                ctx.warnings.push(
                    "Could not retrieve public image URL. Proceeding with default image."
                        .to_string(),
                );
            }
        }
        Ok(())
    }
}

struct InsertProperty {
    store: Arc<dyn DataStore>,
}

#[async_trait]
impl SagaStep<ListingContext> for InsertProperty {
    fn name(&self) -> &'static str {
        "insert_property"
    }

    async fn execute(&self, ctx: &mut ListingContext) -> Result<()> {
        let owner_id = ctx.host.as_ref().map(|h| h.id).ok_or_else(|| AppError::Internal {
            message: "Could not determine host id after creation attempt".to_string(),
        })?;

        let image_url = ctx
            .image_url
            .clone()
            .unwrap_or_else(|| ctx.default_image_url.clone());

        let property = self
            .store
            .insert_property(NewProperty {
                owner_id,
                image_url,
                details: ctx.details.clone(),
            })
            .await?;

        tracing::info!(property_id = property.id, owner_id, "Property listed");
        ctx.property = Some(property);
        Ok(())
    }
}

fn listing_saga(services: &Services) -> Saga<ListingContext> {
    Saga::new("listing")
        .step(EnsureHost {
            store: services.store.clone(),
        })
        .step(UploadImage {
            storage: services.storage.clone(),
        })
        .step(InsertProperty {
            store: services.store.clone(),
        })
}

/// Publish a listing for a tenant, promoting them to host if needed
pub async fn create_listing(
    services: &Services,
    tenant_id: Uuid,
    request: ListingRequest,
) -> Result<ListingResult> {
    let mut details = request.details;
    details.address = details.address.trim().to_string();
    if details.address.is_empty() {
        return Err(AppError::Validation {
            message: "Property address is required".to_string(),
            field: Some("address".to_string()),
        });
    }
    details.validate()?;

    let tenant = services
        .store
        .find_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::not_found("Tenant", tenant_id))?;

    let mut ctx = ListingContext {
        tenant,
        details,
        image: request.image,
        default_image_url: services.workflow.default_image_url.clone(),
        host: None,
        new_host: false,
        image_url: None,
        property: None,
        warnings: Vec::new(),
    };

    listing_saga(services).run(&mut ctx).await?;

    match (ctx.property, ctx.host) {
        (Some(property), Some(host)) => Ok(ListingResult {
            property,
            host,
            new_host: ctx.new_host,
            warnings: ctx.warnings,
        }),
        _ => Err(AppError::Internal {
            message: "listing finished without a property".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailurePoint, NewTenant};
    use crate::workflows::testing::Harness;
    use chrono::NaiveDate;

    async fn tenant(h: &Harness) -> Tenant {
        h.store
            .insert_tenant(NewTenant {
                id: Uuid::new_v4(),
                name: "Grace Hopper".to_string(),
                email: "grace@example.com".to_string(),
                phone: "555-0100".to_string(),
                address: "1 Navy Yard".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1985, 12, 9).unwrap(),
                verification_id: "PP-42".to_string(),
            })
            .await
            .unwrap()
    }

    fn details(address: &str) -> PropertyDetails {
        PropertyDetails {
            address: address.to_string(),
            bedrooms: 2,
            bathrooms: 1,
            essentials: 1,
            air_conditioners: 1,
            kitchens: 1,
            heaters: 1,
            washers: 0,
            dryers: 0,
            tvs: 1,
            area_sqft: 800,
            price_per_night_cents: 10_000,
        }
    }

    fn image() -> ImageUpload {
        ImageUpload {
            file_name: "front.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        }
    }

    #[tokio::test]
    async fn test_first_listing_promotes_tenant() {
        let h = Harness::new();
        let t = tenant(&h).await;

        let result = create_listing(
            &h.services,
            t.id,
            ListingRequest {
                details: details("12 Elm St/Unit 4"),
                image: Some(image()),
            },
        )
        .await
        .unwrap();

        assert!(result.new_host);
        assert!(result.warnings.is_empty());
        assert_eq!(result.host.email, t.email);
        assert_eq!(result.property.owner_id, result.host.id);
        assert_eq!(
            result.property.image_url,
            "memory://propertyImages/12 Elm St-Unit 4.png"
        );
        assert!(h.storage.contains("12 Elm St-Unit 4.png").await);
    }

    #[tokio::test]
    async fn test_returning_host_reuses_profile() {
        let h = Harness::new();
        let t = tenant(&h).await;

        let first = create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("1 First Ave"), image: None },
        )
        .await
        .unwrap();
        let second = create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("2 Second Ave"), image: None },
        )
        .await
        .unwrap();

        assert!(!second.new_host);
        assert_eq!(first.host.id, second.host.id);
        assert_eq!(h.store.host_count().await, 1);
    }

    #[tokio::test]
    async fn test_property_failure_rolls_back_new_host() {
        let h = Harness::new();
        let t = tenant(&h).await;
        h.store.fail_on(FailurePoint::InsertProperty).await;

        let result = create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("1 First Ave"), image: None },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(h.store.host_count().await, 0);
        assert_eq!(h.store.property_count().await, 0);
    }

    #[tokio::test]
    async fn test_property_failure_keeps_existing_host() {
        let h = Harness::new();
        let t = tenant(&h).await;
        create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("1 First Ave"), image: None },
        )
        .await
        .unwrap();

        h.store.fail_on(FailurePoint::InsertProperty).await;
        let result = create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("2 Second Ave"), image: None },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(h.store.host_count().await, 1);
        assert_eq!(h.store.property_count().await, 1);
    }

    #[tokio::test]
    async fn test_host_failure_aborts_without_writes() {
        let h = Harness::new();
        let t = tenant(&h).await;
        h.store.fail_on(FailurePoint::InsertHost).await;

        let result = create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("1 First Ave"), image: Some(image()) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(h.store.property_count().await, 0);
        assert!(!h.storage.contains("1 First Ave.png").await);
    }

    #[tokio::test]
    async fn test_upload_failure_falls_back_to_default_image() {
        let h = Harness::new();
        let t = tenant(&h).await;
        h.storage.set_failing(true).await;

        let result = create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("1 First Ave"), image: Some(image()) },
        )
        .await
        .unwrap();

        assert_eq!(result.property.image_url, h.services.workflow.default_image_url);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Image upload failed:"));
    }

    #[tokio::test]
    async fn test_blank_address_rejected() {
        let h = Harness::new();
        let t = tenant(&h).await;

        let err = create_listing(
            &h.services,
            t.id,
            ListingRequest { details: details("   "), image: None },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(h.store.host_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let h = Harness::new();

        let err = create_listing(
            &h.services,
            Uuid::new_v4(),
            ListingRequest { details: details("1 First Ave"), image: None },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
