//! Credit ledger: reservation, commit and rollback over prioritized balance
//! pools. Every balance mutation in the system goes through this module;
//! nothing else touches pool fields.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::credit::{CreditReservation, CreditSource, PoolBalances};

#[derive(Debug, thiserror::Error)]
#[error("balance store failure: {0}")]
pub struct BalanceStoreError(pub String);

/// Outcome of resolving a hold. `AlreadyResolved` makes commit/rollback
/// idempotent: the caller treats it as success, and no balance is adjusted
/// a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldResolution {
    Applied,
    AlreadyResolved,
    NotFound,
}

/// Persistence seam for pool balances and reservation rows.
///
/// Implementations must make `try_hold` atomic per (tenant, pool): the
/// conditional debit and the insertion of the HELD row happen as one unit,
/// so two concurrent holds can never both observe the same pre-decrement
/// balance. `release_hold` must likewise pair the HELD -> ROLLED_BACK
/// transition with the re-credit atomically.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn balances(&self, tenant_id: &str) -> Result<PoolBalances, BalanceStoreError>;

    /// Attempt to debit `reservation.source` by `reservation.amount` and
    /// record the hold. Returns false when the pool cannot cover the amount
    /// (the VIP pool covers any amount when the tenant's flag is set).
    async fn try_hold(&self, reservation: &CreditReservation) -> Result<bool, BalanceStoreError>;

    /// HELD -> COMMITTED. No balance change.
    async fn finalize_hold(&self, reservation_id: Uuid) -> Result<HoldResolution, BalanceStoreError>;

    /// HELD -> ROLLED_BACK, restoring the amount to the source pool.
    async fn release_hold(&self, reservation_id: Uuid) -> Result<HoldResolution, BalanceStoreError>;

    async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<CreditReservation>, BalanceStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Normal business outcome, surfaced before any generation work starts.
    #[error("insufficient credits for tenant {tenant_id}")]
    InsufficientFunds { tenant_id: String },

    #[error("reservation {0} not found")]
    ReservationNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] BalanceStoreError),
}

impl LedgerError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, LedgerError::InsufficientFunds { .. })
    }
}

/// The ledger's narrow mutation API: reserve, commit, rollback.
pub struct CreditLedger {
    store: Arc<dyn BalanceStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self { store }
    }

    /// Reserve `amount` credits for a tenant, trying pools in priority
    /// order (VIP, prepaid pack, subscription). The first pool that covers
    /// the amount is debited and a HELD reservation recorded.
    pub async fn reserve(
        &self,
        tenant_id: &str,
        customer_id: Option<&str>,
        amount: i64,
    ) -> Result<CreditReservation, LedgerError> {
        for source in CreditSource::PRIORITY {
            let reservation = CreditReservation::hold(
                tenant_id,
                customer_id.map(str::to_string),
                amount,
                source,
            );
            if self.store.try_hold(&reservation).await? {
                tracing::info!(
                    tenant_id,
                    reservation_id = %reservation.id,
                    source = %source,
                    amount,
                    "credits reserved"
                );
                metrics::counter!("credits_reserved_total").increment(amount as u64);
                return Ok(reservation);
            }
        }

        tracing::info!(tenant_id, amount, "reservation refused, no pool can cover");
        Err(LedgerError::InsufficientFunds {
            tenant_id: tenant_id.to_string(),
        })
    }

    /// Finalize a hold after the paid-for work is durably stored. Idempotent.
    pub async fn commit(&self, reservation_id: Uuid) -> Result<(), LedgerError> {
        match self.store.finalize_hold(reservation_id).await? {
            HoldResolution::Applied => {
                tracing::info!(%reservation_id, "reservation committed");
                metrics::counter!("credits_committed_total").increment(1);
                Ok(())
            }
            HoldResolution::AlreadyResolved => Ok(()),
            HoldResolution::NotFound => Err(LedgerError::ReservationNotFound(reservation_id)),
        }
    }

    /// Return a hold's amount to the exact pool it was drawn from.
    /// Idempotent: a resolved reservation is never re-credited.
    pub async fn rollback(&self, reservation_id: Uuid) -> Result<(), LedgerError> {
        match self.store.release_hold(reservation_id).await? {
            HoldResolution::Applied => {
                tracing::info!(%reservation_id, "reservation rolled back");
                metrics::counter!("credits_rolled_back_total").increment(1);
                Ok(())
            }
            HoldResolution::AlreadyResolved => Ok(()),
            HoldResolution::NotFound => Err(LedgerError::ReservationNotFound(reservation_id)),
        }
    }

    pub async fn balances(&self, tenant_id: &str) -> Result<PoolBalances, LedgerError> {
        Ok(self.store.balances(tenant_id).await?)
    }

    pub async fn reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<CreditReservation>, LedgerError> {
        Ok(self.store.get_reservation(reservation_id).await?)
    }
}
