//! Inventory ledger: per-title copy accounting
//!
//! Every change to a title's copy counts runs inside the caller's store
//! transaction, so a reservation is only visible together with the loan it
//! was made for.

use crate::{error::InventoryError, models::Title, repository::CirculationTx};

#[derive(Debug, Clone, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Take one copy off the shelf
    pub async fn reserve_copy(
        &self,
        tx: &mut dyn CirculationTx,
        title_id: i64,
    ) -> Result<Title, InventoryError> {
        let title = tx
            .title_for_update(title_id)
            .await?
            .ok_or(InventoryError::TitleNotFound(title_id))?;

        if title.available_copies == 0 {
            return Err(InventoryError::OutOfStock(title_id));
        }

        Ok(tx.adjust_available_copies(title_id, -1).await?)
    }

    /// Put one copy back on the shelf
    pub async fn release_copy(
        &self,
        tx: &mut dyn CirculationTx,
        title_id: i64,
    ) -> Result<Title, InventoryError> {
        let title = tx
            .title_for_update(title_id)
            .await?
            .ok_or(InventoryError::TitleNotFound(title_id))?;

        if title.available_copies >= title.total_copies {
            tracing::error!(
                title_id,
                total = title.total_copies,
                "Release requested with every copy on the shelf"
            );
            return Err(InventoryError::AlreadyFull(title_id));
        }

        Ok(tx.adjust_available_copies(title_id, 1).await?)
    }

    /// Change the number of owned copies, keeping the number on loan unchanged
    pub async fn resize(
        &self,
        tx: &mut dyn CirculationTx,
        title_id: i64,
        total_copies: i32,
    ) -> Result<Title, InventoryError> {
        let title = tx
            .title_for_update(title_id)
            .await?
            .ok_or(InventoryError::TitleNotFound(title_id))?;

        let on_loan = title.on_loan();
        if total_copies < 1 || total_copies < on_loan {
            return Err(InventoryError::InvalidTotal {
                title_id,
                requested: total_copies,
                on_loan,
            });
        }

        let delta = total_copies - title.total_copies;
        if delta == 0 {
            return Ok(title);
        }
        Ok(tx.resize_title(title_id, delta).await?)
    }
}
