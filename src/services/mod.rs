//! Business logic services

pub mod catalog;
pub mod fines;
pub mod inventory;
pub mod limits;
pub mod loans;
pub mod stats;

use crate::{config::CirculationConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub stats: stats::StatsService,
}

impl Services {
    /// Create all services over the given repository
    pub fn new(repository: Repository, config: &CirculationConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), config),
            stats: stats::StatsService::new(repository.clone(), config.top_borrowed_limit),
            repository,
        }
    }
}
