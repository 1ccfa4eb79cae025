//! In-memory implementations of the pipeline's trait seams, used by the
//! ledger and pipeline test suites.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use uuid::Uuid;

use tryon_studio::models::credit::{CreditReservation, CreditSource, PoolBalances, ReservationState};
use tryon_studio::models::job::TryOnJob;
use tryon_studio::services::generation::GenerationClient;
use tryon_studio::services::ledger::{
    BalanceStore, BalanceStoreError, CreditLedger, HoldResolution,
};
use tryon_studio::services::orchestrator::{JobOrchestrator, JobStore, JobStoreError};
use tryon_studio::services::retry::RetryPolicy;
use tryon_studio::services::storage::{BlobStore, StorageError};
use tryon_studio::services::synthesis::{
    ImageSynthesizer, SynthesisError, SynthesisRequest, SynthesizedImage,
};

// ── Job store ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, TryOnJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, job_id: Uuid) -> Result<Option<TryOnJob>, JobStoreError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn put(&self, job: &TryOnJob) -> Result<(), JobStoreError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }
}

// ── Balance store ───────────────────────────────────────────────────────

#[derive(Default)]
struct BalanceState {
    balances: HashMap<String, PoolBalances>,
    reservations: HashMap<Uuid, CreditReservation>,
}

/// Serializes every operation behind one mutex, which is this store's
/// equivalent of the per-pool serialization point.
#[derive(Default)]
pub struct InMemoryBalanceStore {
    state: Mutex<BalanceState>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_tenant(&self, tenant_id: &str, balances: PoolBalances) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(tenant_id.to_string(), balances);
    }

    pub fn reservation_count(&self) -> usize {
        self.state.lock().unwrap().reservations.len()
    }

    pub fn reservation_state(&self, reservation_id: Uuid) -> Option<ReservationState> {
        self.state
            .lock()
            .unwrap()
            .reservations
            .get(&reservation_id)
            .map(|r| r.state)
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn balances(&self, tenant_id: &str) -> Result<PoolBalances, BalanceStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(tenant_id)
            .copied()
            .unwrap_or_default())
    }

    async fn try_hold(&self, reservation: &CreditReservation) -> Result<bool, BalanceStoreError> {
        let mut state = self.state.lock().unwrap();
        let pools = state
            .balances
            .entry(reservation.tenant_id.clone())
            .or_default();

        match reservation.source {
            CreditSource::Vip => {
                if !pools.vip_unlimited {
                    return Ok(false);
                }
            }
            CreditSource::PrepaidPack => {
                if pools.pack_credits < reservation.amount {
                    return Ok(false);
                }
                pools.pack_credits -= reservation.amount;
            }
            CreditSource::Subscription => {
                if pools.subscription_credits < reservation.amount {
                    return Ok(false);
                }
                pools.subscription_credits -= reservation.amount;
            }
        }

        state
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(true)
    }

    async fn finalize_hold(&self, reservation_id: Uuid) -> Result<HoldResolution, BalanceStoreError> {
        let mut state = self.state.lock().unwrap();
        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Ok(HoldResolution::NotFound);
        };
        if reservation.state != ReservationState::Held {
            return Ok(HoldResolution::AlreadyResolved);
        }
        reservation.state = ReservationState::Committed;
        reservation.resolved_at = Some(Utc::now());
        Ok(HoldResolution::Applied)
    }

    async fn release_hold(&self, reservation_id: Uuid) -> Result<HoldResolution, BalanceStoreError> {
        let mut state = self.state.lock().unwrap();
        let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
            return Ok(HoldResolution::NotFound);
        };
        if reservation.state != ReservationState::Held {
            return Ok(HoldResolution::AlreadyResolved);
        }
        reservation.state = ReservationState::RolledBack;
        reservation.resolved_at = Some(Utc::now());

        let (tenant_id, source, amount) = (
            reservation.tenant_id.clone(),
            reservation.source,
            reservation.amount,
        );
        let pools = state.balances.entry(tenant_id).or_default();
        match source {
            CreditSource::Vip => {}
            CreditSource::PrepaidPack => pools.pack_credits += amount,
            CreditSource::Subscription => pools.subscription_credits += amount,
        }
        Ok(HoldResolution::Applied)
    }

    async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<CreditReservation>, BalanceStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reservations
            .get(&reservation_id)
            .cloned())
    }
}

// ── Blob store ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected write failure".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("https://assets.test/{key}"))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        // Unseeded keys resolve to placeholder bytes; input fetching is not
        // what these suites exercise.
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_else(|| b"placeholder-input".to_vec()))
    }
}

// ── Synthesizers ────────────────────────────────────────────────────────

pub enum SynthBehavior {
    Succeed,
    RateLimit,
    HardError,
}

/// Scripted synthesizer that counts attempts and records requests.
pub struct ScriptedSynthesizer {
    behavior: SynthBehavior,
    calls: AtomicUsize,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl ScriptedSynthesizer {
    pub fn new(behavior: SynthBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SynthesisRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ImageSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedImage, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match self.behavior {
            SynthBehavior::Succeed => Ok(SynthesizedImage {
                base64_data: base64::engine::general_purpose::STANDARD.encode(b"generated-image"),
                mime_type: "image/png".to_string(),
            }),
            SynthBehavior::RateLimit => Err(SynthesisError::RateLimited),
            SynthBehavior::HardError => Err(SynthesisError::Upstream {
                status: 400,
                message: "content policy block".to_string(),
            }),
        }
    }
}

// ── Wiring ──────────────────────────────────────────────────────────────

pub const COST: i64 = 1;

pub fn ledger(store: &Arc<InMemoryBalanceStore>) -> CreditLedger {
    CreditLedger::new(store.clone() as Arc<dyn BalanceStore>)
}

/// Orchestrator wired with the given fakes and a fast retry schedule.
pub fn orchestrator(
    jobs: &Arc<InMemoryJobStore>,
    balances: &Arc<InMemoryBalanceStore>,
    blobs: &Arc<InMemoryBlobStore>,
    synthesizer: Arc<dyn ImageSynthesizer>,
) -> JobOrchestrator {
    let generation = GenerationClient::new(
        synthesizer,
        RetryPolicy::new(vec![Duration::from_millis(1), Duration::from_millis(1)]),
        Duration::from_secs(2),
    );
    JobOrchestrator::new(
        jobs.clone() as Arc<dyn JobStore>,
        ledger(balances),
        generation,
        blobs.clone() as Arc<dyn BlobStore>,
        COST,
    )
}

pub fn pack_only(credits: i64) -> PoolBalances {
    PoolBalances {
        vip_unlimited: false,
        pack_credits: credits,
        subscription_credits: 0,
    }
}
