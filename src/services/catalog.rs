//! Reference data management and the initial catalog seed.

use std::{collections::HashSet, path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    db::{DbError, DbPool, DbResult},
    models::{
        AllowedSender, Country, CreateAllowedSender, CreateCountry, CreateOperator,
        CreateProvider, CreateService, Operator, Provider, Service,
    },
};

/// Contents of a catalog seed file such as `data/catalog.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSeed {
    #[serde(default)]
    pub countries: Vec<CreateCountry>,
    #[serde(default)]
    pub services: Vec<CreateService>,
}

impl CatalogSeed {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse seed file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Rows written by [`CatalogService::seed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub countries: usize,
    pub services: usize,
    pub skipped_services: usize,
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn list_services(&self) -> DbResult<Vec<Service>> {
        self.db.catalog().list_services().await
    }

    pub async fn create_service(&self, input: CreateService) -> DbResult<Service> {
        self.db.catalog().create_service(input).await
    }

    pub async fn list_allowed_senders(&self, service_id: Option<i64>) -> DbResult<Vec<AllowedSender>> {
        self.db.catalog().list_allowed_senders(service_id).await
    }

    pub async fn create_allowed_sender(&self, input: CreateAllowedSender) -> DbResult<AllowedSender> {
        self.db.catalog().create_allowed_sender(input).await
    }

    pub async fn list_countries(&self) -> DbResult<Vec<Country>> {
        self.db.catalog().list_countries().await
    }

    pub async fn create_country(&self, input: CreateCountry) -> DbResult<Country> {
        self.db.catalog().create_country(input).await
    }

    pub async fn list_operators(&self, country_id: Option<i64>) -> DbResult<Vec<Operator>> {
        self.db.catalog().list_operators(country_id).await
    }

    pub async fn create_operator(&self, input: CreateOperator) -> DbResult<Operator> {
        self.db.catalog().create_operator(input).await
    }

    pub async fn list_providers(&self) -> DbResult<Vec<Provider>> {
        self.db.catalog().list_providers().await
    }

    pub async fn create_provider(&self, input: CreateProvider) -> DbResult<Provider> {
        let provider = self.db.catalog().create_provider(input).await?;
        tracing::info!(provider_id = provider.id, name = %provider.name, "Provider created");
        Ok(provider)
    }

    /// Insert countries and services, each only while its table is empty.
    /// Services repeating an earlier code or name are skipped.
    pub async fn seed(&self, seed: CatalogSeed) -> DbResult<SeedSummary> {
        let catalog = self.db.catalog();
        let mut summary = SeedSummary::default();

        if catalog.count_countries().await? == 0 {
            for country in seed.countries {
                catalog.create_country(country).await?;
                summary.countries += 1;
            }
        } else {
            tracing::info!("Countries already present, skipping");
        }

        if catalog.count_services().await? == 0 {
            let mut codes = HashSet::new();
            let mut names = HashSet::new();
            for service in seed.services {
                if !codes.insert(service.code.clone()) || !names.insert(service.name.clone()) {
                    tracing::warn!(code = %service.code, name = %service.name, "Duplicate service skipped");
                    summary.skipped_services += 1;
                    continue;
                }
                catalog.create_service(service).await?;
                summary.services += 1;
            }
        } else {
            tracing::info!("Services already present, skipping");
        }

        tracing::info!(
            countries = summary.countries,
            services = summary.services,
            skipped_services = summary.skipped_services,
            "Catalog seeded"
        );
        Ok(summary)
    }
}
