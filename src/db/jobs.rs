use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{ErrorDetail, JobKind, JobStatus, TryOnJob};
use crate::services::orchestrator::{JobStore, JobStoreError};

/// Postgres-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: impl std::fmt::Display) -> JobStoreError {
    JobStoreError(e.to_string())
}

fn job_from_row(row: sqlx::postgres::PgRow) -> Result<TryOnJob, JobStoreError> {
    let status_str: String = row.try_get("status").map_err(store_err)?;
    let kind_str: String = row.try_get("kind").map_err(store_err)?;

    let input_refs: serde_json::Value = row.try_get("input_refs").map_err(store_err)?;
    let product_tags: serde_json::Value = row.try_get("product_tags").map_err(store_err)?;
    let error: Option<serde_json::Value> = row.try_get("error").map_err(store_err)?;

    let error: Option<ErrorDetail> = error
        .map(serde_json::from_value)
        .transpose()
        .map_err(store_err)?;

    Ok(TryOnJob {
        id: row.try_get("id").map_err(store_err)?,
        tenant_id: row.try_get("tenant_id").map_err(store_err)?,
        customer_id: row.try_get("customer_id").map_err(store_err)?,
        kind: JobKind::from_str(&kind_str).map_err(store_err)?,
        status: JobStatus::from_str(&status_str).map_err(store_err)?,
        input_refs: serde_json::from_value(input_refs).map_err(store_err)?,
        product_tags: serde_json::from_value(product_tags).map_err(store_err)?,
        reservation_id: row.try_get("reservation_id").map_err(store_err)?,
        result_asset_url: row.try_get("result_asset_url").map_err(store_err)?,
        error,
        created_at: row.try_get("created_at").map_err(store_err)?,
        started_at: row.try_get("started_at").map_err(store_err)?,
        completed_at: row.try_get("completed_at").map_err(store_err)?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, job_id: Uuid) -> Result<Option<TryOnJob>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, customer_id, kind, status, input_refs, product_tags,
                   reservation_id, result_asset_url, error, created_at, started_at, completed_at
            FROM tryon_jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(job_from_row).transpose()
    }

    async fn put(&self, job: &TryOnJob) -> Result<(), JobStoreError> {
        let input_refs = serde_json::to_value(&job.input_refs).map_err(store_err)?;
        let product_tags = serde_json::to_value(&job.product_tags).map_err(store_err)?;
        let error = job
            .error
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO tryon_jobs
                (id, tenant_id, customer_id, kind, status, input_refs, product_tags,
                 reservation_id, result_asset_url, error, created_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                reservation_id = EXCLUDED.reservation_id,
                result_asset_url = EXCLUDED.result_asset_url,
                error = EXCLUDED.error,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(job.id)
        .bind(&job.tenant_id)
        .bind(&job.customer_id)
        .bind(job.kind.to_string())
        .bind(job.status.to_string())
        .bind(input_refs)
        .bind(product_tags)
        .bind(job.reservation_id)
        .bind(job.result_asset_url.as_deref())
        .bind(error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}
