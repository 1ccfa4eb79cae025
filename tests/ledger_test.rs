//! Ledger contract tests: pool priority, conservation, idempotency and
//! concurrent reservation safety over the in-memory balance store.

mod support;

use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use support::{ledger, pack_only, InMemoryBalanceStore};
use tryon_studio::models::credit::{CreditSource, PoolBalances, ReservationState};
use tryon_studio::services::ledger::LedgerError;

const TENANT: &str = "lojista-1";

#[tokio::test]
async fn reserve_tries_pools_in_priority_order() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(
        TENANT,
        PoolBalances {
            vip_unlimited: false,
            pack_credits: 1,
            subscription_credits: 5,
        },
    );
    let ledger = ledger(&store);

    // Pack pool wins while it can cover the amount.
    let first = ledger.reserve(TENANT, Some("c-1"), 1).await.unwrap();
    assert_eq!(first.source, CreditSource::PrepaidPack);

    // Pack exhausted, subscription pool takes over.
    let second = ledger.reserve(TENANT, Some("c-1"), 1).await.unwrap();
    assert_eq!(second.source, CreditSource::Subscription);

    let balances = ledger.balances(TENANT).await.unwrap();
    assert_eq!(balances.pack_credits, 0);
    assert_eq!(balances.subscription_credits, 4);
}

#[tokio::test]
async fn vip_pool_wins_and_never_debits() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(
        TENANT,
        PoolBalances {
            vip_unlimited: true,
            pack_credits: 2,
            subscription_credits: 2,
        },
    );
    let ledger = ledger(&store);

    let reservation = ledger.reserve(TENANT, None, 1).await.unwrap();
    assert_eq!(reservation.source, CreditSource::Vip);

    let balances = ledger.balances(TENANT).await.unwrap();
    assert_eq!(balances.finite_total(), 4);

    // Rolling a VIP hold back restores nothing either.
    ledger.rollback(reservation.id).await.unwrap();
    let balances = ledger.balances(TENANT).await.unwrap();
    assert_eq!(balances.finite_total(), 4);
    assert_eq!(
        store.reservation_state(reservation.id),
        Some(ReservationState::RolledBack)
    );
}

#[tokio::test]
async fn insufficient_funds_creates_no_reservation() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(TENANT, pack_only(0));
    let ledger = ledger(&store);

    let err = ledger.reserve(TENANT, Some("c-1"), 1).await.unwrap_err();
    assert!(err.is_insufficient_funds());
    assert_eq!(store.reservation_count(), 0);
    assert_eq!(ledger.balances(TENANT).await.unwrap().finite_total(), 0);
}

#[tokio::test]
async fn held_funds_are_invisible_to_other_reservations() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(TENANT, pack_only(1));
    let ledger = ledger(&store);

    let held = ledger.reserve(TENANT, None, 1).await.unwrap();
    // The single credit is on hold, not spendable twice.
    assert!(ledger.reserve(TENANT, None, 1).await.unwrap_err().is_insufficient_funds());

    ledger.rollback(held.id).await.unwrap();
    // After rollback it is spendable again.
    ledger.reserve(TENANT, None, 1).await.unwrap();
}

#[tokio::test]
async fn concurrent_reserves_cannot_double_spend_the_last_credit() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(TENANT, pack_only(1));
    let ledger = Arc::new(ledger(&store));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.reserve(TENANT, None, 1).await })
        })
        .collect();

    let results: Vec<Result<_, LedgerError>> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let refusals = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_insufficient_funds()))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(refusals, 7);
    assert_eq!(ledger.balances(TENANT).await.unwrap().finite_total(), 0);
}

#[tokio::test]
async fn commit_finalizes_without_balance_change() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(TENANT, pack_only(3));
    let ledger = ledger(&store);

    let reservation = ledger.reserve(TENANT, Some("c-2"), 1).await.unwrap();
    assert_eq!(ledger.balances(TENANT).await.unwrap().finite_total(), 2);

    ledger.commit(reservation.id).await.unwrap();
    // Funds were subtracted at reservation time; commit changes nothing.
    assert_eq!(ledger.balances(TENANT).await.unwrap().finite_total(), 2);
    assert_eq!(
        store.reservation_state(reservation.id),
        Some(ReservationState::Committed)
    );
}

#[tokio::test]
async fn rollback_restores_the_exact_source_pool() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(
        TENANT,
        PoolBalances {
            vip_unlimited: false,
            pack_credits: 0,
            subscription_credits: 3,
        },
    );
    let ledger = ledger(&store);

    let reservation = ledger.reserve(TENANT, None, 1).await.unwrap();
    assert_eq!(reservation.source, CreditSource::Subscription);

    ledger.rollback(reservation.id).await.unwrap();
    let balances = ledger.balances(TENANT).await.unwrap();
    assert_eq!(balances.subscription_credits, 3);
    assert_eq!(balances.pack_credits, 0);
}

#[tokio::test]
async fn rollback_is_idempotent() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(TENANT, pack_only(2));
    let ledger = ledger(&store);

    let reservation = ledger.reserve(TENANT, None, 1).await.unwrap();
    ledger.rollback(reservation.id).await.unwrap();
    ledger.rollback(reservation.id).await.unwrap();
    ledger.rollback(reservation.id).await.unwrap();

    // Credited back exactly once.
    assert_eq!(ledger.balances(TENANT).await.unwrap().pack_credits, 2);
}

#[tokio::test]
async fn commit_is_idempotent_and_resolved_reservations_stay_resolved() {
    let store = InMemoryBalanceStore::new();
    store.seed_tenant(TENANT, pack_only(2));
    let ledger = ledger(&store);

    let reservation = ledger.reserve(TENANT, None, 1).await.unwrap();
    ledger.commit(reservation.id).await.unwrap();
    ledger.commit(reservation.id).await.unwrap();

    // A committed reservation must not be refundable.
    ledger.rollback(reservation.id).await.unwrap();
    assert_eq!(ledger.balances(TENANT).await.unwrap().pack_credits, 1);
    assert_eq!(
        store.reservation_state(reservation.id),
        Some(ReservationState::Committed)
    );
}

#[tokio::test]
async fn resolving_an_unknown_reservation_is_reported() {
    let store = InMemoryBalanceStore::new();
    let ledger = ledger(&store);

    let missing = Uuid::new_v4();
    assert!(matches!(
        ledger.commit(missing).await.unwrap_err(),
        LedgerError::ReservationNotFound(id) if id == missing
    ));
    assert!(matches!(
        ledger.rollback(missing).await.unwrap_err(),
        LedgerError::ReservationNotFound(id) if id == missing
    ));
}
