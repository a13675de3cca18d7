use crate::{
    db::DbPool,
    entities::setting::{self, Entity as Setting},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Settings key holding the configured costing policy.
pub const PRICING_METHOD_KEY: &str = "pricingMethod";

/// Costing policy used to quote a product's price from its lots.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum PricingMethod {
    Fifo,
    Lifo,
    Max,
    WeightedAverage,
}

/// Read/write access to persisted key/value settings.
#[derive(Clone)]
pub struct SettingsService {
    db_pool: Arc<DbPool>,
}

impl SettingsService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Fetches a raw setting value by key.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<String, ServiceError> {
        let db = &*self.db_pool;

        let row = Setting::find_by_id(key.to_string())
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Setting '{}' not found", key)))?;

        Ok(row.value)
    }

    /// Inserts or replaces a setting value.
    #[instrument(skip(self))]
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let existing = Setting::find_by_id(key.to_string())
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        match existing {
            Some(row) => {
                let mut active: setting::ActiveModel = row.into();
                active.value = Set(value.to_string());
                active.updated_at = Set(Utc::now());
                active.update(db).await.map_err(ServiceError::DatabaseError)?;
            }
            None => {
                let active = setting::ActiveModel {
                    key: Set(key.to_string()),
                    value: Set(value.to_string()),
                    updated_at: Set(Utc::now()),
                };
                active.insert(db).await.map_err(ServiceError::DatabaseError)?;
            }
        }

        Ok(())
    }

    /// Resolves the configured costing policy.
    ///
    /// A missing setting is `NotFound` and an unknown value is a
    /// `ValidationError`; pricing must not fall back silently.
    #[instrument(skip(self))]
    pub async fn pricing_method(&self) -> Result<PricingMethod, ServiceError> {
        let raw = self.get(PRICING_METHOD_KEY).await?;

        PricingMethod::from_str(&raw).map_err(|_| {
            ServiceError::ValidationError(format!(
                "Unknown pricing method '{}' in settings; expected one of fifo, lifo, max, weightedAverage",
                raw
            ))
        })
    }
}
