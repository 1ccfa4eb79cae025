use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobKind, JobStatus, TryOnJob};
use crate::models::tryon::{JobStatusResponse, TryOnRequestMeta, TryOnResponse};
use crate::services::orchestrator::JobStore;
use crate::services::queue::QueuedJob;
use crate::services::storage::BlobStore;

const MAX_GARMENTS: usize = 3;
const MAX_INPUT_REFS: usize = 4;

struct UploadedImage {
    bytes: Vec<u8>,
    content_type: &'static str,
    extension: &'static str,
}

/// POST /api/v1/tryon — submit a person photo plus garment photos for a
/// fresh try-on generation.
pub async fn submit_tryon(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TryOnResponse>, (StatusCode, String)> {
    let (meta, person, garments) = read_submission(multipart).await?;
    meta.validate()
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let person = person.ok_or((
        StatusCode::BAD_REQUEST,
        "a 'person' image part is required".to_string(),
    ))?;
    if garments.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "at least one 'garment' image part is required".to_string(),
        ));
    }

    let mut input_refs = Vec::with_capacity(garments.len() + 1);
    input_refs.push(upload_input(&state, &meta.tenant_id, &person).await?);
    for garment in &garments {
        input_refs.push(upload_input(&state, &meta.tenant_id, garment).await?);
    }

    let job = TryOnJob::new(
        meta.tenant_id.clone(),
        meta.customer_id.clone(),
        JobKind::Fresh,
        input_refs,
        meta.tags(),
    );
    create_and_enqueue(&state, &job).await?;

    Ok(Json(TryOnResponse {
        job_id: job.id,
        status: job.status,
        message: "Try-on submitted for generation".to_string(),
    }))
}

/// POST /api/v1/tryon/{job_id}/remix — regenerate a completed try-on with a
/// fresh background/pose, optionally layering extra garments.
pub async fn submit_remix(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<TryOnResponse>, (StatusCode, String)> {
    let source = state
        .jobs
        .get(job_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "source job not found".to_string()))?;

    if source.status != JobStatus::Completed {
        return Err((
            StatusCode::CONFLICT,
            format!("source job is {}, only completed jobs can be remixed", source.status),
        ));
    }

    let (_, _, extra_garments) = read_submission(multipart).await?;

    let mut input_refs = source.input_refs.clone();
    for garment in &extra_garments {
        input_refs.push(upload_input(&state, &source.tenant_id, garment).await?);
    }
    if input_refs.len() > MAX_INPUT_REFS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("at most {} input images per job", MAX_INPUT_REFS),
        ));
    }

    let job = TryOnJob::new(
        source.tenant_id.clone(),
        source.customer_id.clone(),
        JobKind::Remix,
        input_refs,
        source.product_tags.clone(),
    );
    create_and_enqueue(&state, &job).await?;

    Ok(Json(TryOnResponse {
        job_id: job.id,
        status: job.status,
        message: "Remix submitted for generation".to_string(),
    }))
}

/// GET /api/v1/tryon/{job_id} — poll job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, (StatusCode, String)> {
    let job = state
        .jobs
        .get(job_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        kind: job.kind,
        result_asset_url: job.result_asset_url,
        error: job.error,
    }))
}

async fn read_submission(
    mut multipart: Multipart,
) -> Result<(TryOnRequestMeta, Option<UploadedImage>, Vec<UploadedImage>), (StatusCode, String)> {
    let mut meta = TryOnRequestMeta::default();
    let mut person: Option<UploadedImage> = None;
    let mut garments: Vec<UploadedImage> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        match field.name() {
            Some("person") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                person = Some(decode_image(&data)?);
            }
            Some("garment") => {
                if garments.len() >= MAX_GARMENTS {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        format!("at most {} garment images", MAX_GARMENTS),
                    ));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                garments.push(decode_image(&data)?);
            }
            Some("tenant_id") => {
                meta.tenant_id = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            }
            Some("customer_id") => {
                meta.customer_id = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            }
            Some("product_tags") => {
                meta.product_tags = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    Ok((meta, person, garments))
}

fn decode_image(data: &[u8]) -> Result<UploadedImage, (StatusCode, String)> {
    // Sniff the actual format rather than trusting the declared content type.
    let format = image::guess_format(data).map_err(|_| {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unrecognized image format".to_string(),
        )
    })?;

    let (content_type, extension) = match format {
        image::ImageFormat::Jpeg => ("image/jpeg", "jpg"),
        image::ImageFormat::WebP => ("image/webp", "webp"),
        image::ImageFormat::Png => ("image/png", "png"),
        _ => {
            return Err((
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "only PNG, JPEG and WebP images are accepted".to_string(),
            ))
        }
    };

    Ok(UploadedImage {
        bytes: data.to_vec(),
        content_type,
        extension,
    })
}

async fn upload_input(
    state: &AppState,
    tenant_id: &str,
    upload: &UploadedImage,
) -> Result<String, (StatusCode, String)> {
    let key = format!("tenants/{}/inputs/{}.{}", tenant_id, Uuid::new_v4(), upload.extension);
    state
        .storage
        .put_object(&key, &upload.bytes, upload.content_type)
        .await
        .map_err(internal)?;
    Ok(key)
}

async fn create_and_enqueue(state: &AppState, job: &TryOnJob) -> Result<(), (StatusCode, String)> {
    state.jobs.put(job).await.map_err(internal)?;
    state
        .queue
        .enqueue(&QueuedJob::new(job.id, job.tenant_id.clone()))
        .await
        .map_err(internal)?;

    metrics::counter!("tryon_jobs_total").increment(1);
    tracing::info!(job_id = %job.id, tenant_id = %job.tenant_id, kind = %job.kind, "job accepted");
    Ok(())
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
