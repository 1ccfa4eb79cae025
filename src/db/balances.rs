use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::credit::{CreditReservation, CreditSource, PoolBalances, ReservationState};
use crate::services::ledger::{BalanceStore, BalanceStoreError, HoldResolution};

/// Postgres-backed balance store.
///
/// Atomicity comes from conditional single-statement updates: the debit
/// (`SET x = x - $n WHERE x >= $n`) and the reservation insert share one
/// transaction, so concurrent holds serialize on the balance row.
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: impl std::fmt::Display) -> BalanceStoreError {
    BalanceStoreError(e.to_string())
}

/// Balance column backing a source pool; the VIP pool has none.
fn pool_column(source: CreditSource) -> Option<&'static str> {
    match source {
        CreditSource::Vip => None,
        CreditSource::PrepaidPack => Some("pack_credits"),
        CreditSource::Subscription => Some("subscription_credits"),
    }
}

fn reservation_from_row(row: sqlx::postgres::PgRow) -> Result<CreditReservation, BalanceStoreError> {
    let source_str: String = row.try_get("source").map_err(store_err)?;
    let state_str: String = row.try_get("state").map_err(store_err)?;

    Ok(CreditReservation {
        id: row.try_get("id").map_err(store_err)?,
        tenant_id: row.try_get("tenant_id").map_err(store_err)?,
        customer_id: row.try_get("customer_id").map_err(store_err)?,
        amount: row.try_get("amount").map_err(store_err)?,
        source: CreditSource::from_str(&source_str).map_err(store_err)?,
        state: ReservationState::from_str(&state_str).map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        resolved_at: row.try_get("resolved_at").map_err(store_err)?,
    })
}

async fn insert_reservation(
    tx: &mut sqlx::PgConnection,
    reservation: &CreditReservation,
) -> Result<(), BalanceStoreError> {
    sqlx::query(
        r#"
        INSERT INTO credit_reservations (id, tenant_id, customer_id, amount, source, state, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(reservation.id)
    .bind(&reservation.tenant_id)
    .bind(reservation.customer_id.as_deref())
    .bind(reservation.amount)
    .bind(reservation.source.to_string())
    .bind(reservation.state.to_string())
    .bind(reservation.created_at)
    .execute(tx)
    .await
    .map_err(store_err)?;
    Ok(())
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn balances(&self, tenant_id: &str) -> Result<PoolBalances, BalanceStoreError> {
        let row = sqlx::query(
            r#"
            SELECT vip_unlimited, pack_credits, subscription_credits
            FROM tenant_balances
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(match row {
            Some(r) => PoolBalances {
                vip_unlimited: r.try_get("vip_unlimited").map_err(store_err)?,
                pack_credits: r.try_get("pack_credits").map_err(store_err)?,
                subscription_credits: r.try_get("subscription_credits").map_err(store_err)?,
            },
            None => PoolBalances::default(),
        })
    }

    async fn try_hold(&self, reservation: &CreditReservation) -> Result<bool, BalanceStoreError> {
        let Some(column) = pool_column(reservation.source) else {
            // VIP is unlimited: no debit, just the audit row, and only when
            // the tenant's flag is set.
            let vip: Option<bool> = sqlx::query(
                "SELECT vip_unlimited FROM tenant_balances WHERE tenant_id = $1",
            )
            .bind(&reservation.tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(|r| r.try_get("vip_unlimited"))
            .transpose()
            .map_err(store_err)?;

            if vip != Some(true) {
                return Ok(false);
            }
            let mut tx = self.pool.begin().await.map_err(store_err)?;
            insert_reservation(&mut *tx, reservation).await?;
            tx.commit().await.map_err(store_err)?;
            return Ok(true);
        };

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let debited = sqlx::query(&format!(
            r#"
            UPDATE tenant_balances
            SET {column} = {column} - $2, updated_at = NOW()
            WHERE tenant_id = $1 AND {column} >= $2
            "#,
        ))
        .bind(&reservation.tenant_id)
        .bind(reservation.amount)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        if debited.rows_affected() == 0 {
            tx.rollback().await.map_err(store_err)?;
            return Ok(false);
        }

        insert_reservation(&mut *tx, reservation).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(true)
    }

    async fn finalize_hold(&self, reservation_id: Uuid) -> Result<HoldResolution, BalanceStoreError> {
        let claimed = sqlx::query(
            r#"
            UPDATE credit_reservations
            SET state = 'committed', resolved_at = NOW()
            WHERE id = $1 AND state = 'held'
            "#,
        )
        .bind(reservation_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if claimed.rows_affected() == 1 {
            return Ok(HoldResolution::Applied);
        }
        self.resolution_for_unclaimed(reservation_id).await
    }

    async fn release_hold(&self, reservation_id: Uuid) -> Result<HoldResolution, BalanceStoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let claimed = sqlx::query(
            r#"
            UPDATE credit_reservations
            SET state = 'rolled_back', resolved_at = NOW()
            WHERE id = $1 AND state = 'held'
            RETURNING tenant_id, source, amount
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        let Some(row) = claimed else {
            tx.rollback().await.map_err(store_err)?;
            return self.resolution_for_unclaimed(reservation_id).await;
        };

        let tenant_id: String = row.try_get("tenant_id").map_err(store_err)?;
        let source_str: String = row.try_get("source").map_err(store_err)?;
        let amount: i64 = row.try_get("amount").map_err(store_err)?;
        let source = CreditSource::from_str(&source_str).map_err(store_err)?;

        if let Some(column) = pool_column(source) {
            sqlx::query(&format!(
                r#"
                UPDATE tenant_balances
                SET {column} = {column} + $2, updated_at = NOW()
                WHERE tenant_id = $1
                "#,
            ))
            .bind(&tenant_id)
            .bind(amount)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(HoldResolution::Applied)
    }

    async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<CreditReservation>, BalanceStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, customer_id, amount, source, state, created_at, resolved_at
            FROM credit_reservations
            WHERE id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(reservation_from_row).transpose()
    }
}

impl PgBalanceStore {
    async fn resolution_for_unclaimed(
        &self,
        reservation_id: Uuid,
    ) -> Result<HoldResolution, BalanceStoreError> {
        let exists: Option<sqlx::postgres::PgRow> =
            sqlx::query("SELECT 1 AS one FROM credit_reservations WHERE id = $1")
                .bind(reservation_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(if exists.is_some() {
            HoldResolution::AlreadyResolved
        } else {
            HoldResolution::NotFound
        })
    }
}
