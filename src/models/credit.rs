use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which balance pool satisfied a reservation.
///
/// `PRIORITY` is the business rule: the first viable pool wins. VIP is an
/// unlimited source and is consulted before any finite pool is debited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CreditSource {
    Vip,
    PrepaidPack,
    Subscription,
}

impl CreditSource {
    pub const PRIORITY: [CreditSource; 3] = [
        CreditSource::Vip,
        CreditSource::PrepaidPack,
        CreditSource::Subscription,
    ];
}

/// Lifecycle of a credit hold. A reservation leaves `Held` exactly once;
/// resolving an already-resolved reservation never adjusts balances again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReservationState {
    Held,
    Committed,
    RolledBack,
}

/// A provisional hold of credits against one tenant pool, created before any
/// generation compute is spent and resolved by commit or rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReservation {
    pub id: Uuid,
    pub tenant_id: String,
    pub customer_id: Option<String>,
    pub amount: i64,
    pub source: CreditSource,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl CreditReservation {
    pub fn hold(
        tenant_id: impl Into<String>,
        customer_id: Option<String>,
        amount: i64,
        source: CreditSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            customer_id,
            amount,
            source,
            state: ReservationState::Held,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Per-tenant snapshot of the credit pools.
///
/// Held amounts are already subtracted from the visible pack/subscription
/// figures, so concurrent jobs cannot both spend the last unit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolBalances {
    pub vip_unlimited: bool,
    pub pack_credits: i64,
    pub subscription_credits: i64,
}

impl PoolBalances {
    /// Total spendable credits across the finite pools.
    pub fn finite_total(&self) -> i64 {
        self.pack_credits + self.subscription_credits
    }
}
