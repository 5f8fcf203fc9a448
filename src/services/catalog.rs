//! Catalog maintenance hooks owned by the circulation core

use crate::{
    error::{AppError, AppResult, InventoryError},
    models::Title,
    repository::Repository,
};

use super::inventory::InventoryLedger;

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    ledger: InventoryLedger,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            ledger: InventoryLedger::new(),
        }
    }

    pub async fn get_title(&self, title_id: i64) -> AppResult<Title> {
        self.repository
            .within(self.repository.store().get_title(title_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Title {} not found", title_id)))
    }

    /// Change how many copies a title owns; copies on loan stay on loan
    pub async fn resize_title(&self, title_id: i64, total_copies: i32) -> Result<Title, InventoryError> {
        let title = self
            .repository
            .within(async {
                let mut tx = self.repository.store().begin().await?;
                let title = self.ledger.resize(tx.as_mut(), title_id, total_copies).await?;
                tx.commit().await?;
                Ok::<_, InventoryError>(title)
            })
            .await?;

        tracing::info!(
            title_id,
            total = title.total_copies,
            available = title.available_copies,
            "Title resized"
        );
        Ok(title)
    }
}
