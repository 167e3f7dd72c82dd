//! Route handlers.
//!
//! Inference failures are answered with `200` and a structured body; only a
//! concurrent model pull is reported as an HTTP error (`409`).

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::InputShape;
use crate::pipeline::InferenceOutcome;

use super::AppState;

/// Name of the multipart field carrying the image.
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct InferenceQuery {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncInferenceRequest {
    pub image_url: String,
    pub submission_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub app_name: String,
    pub input_shape: InputShape,
    pub downloading: bool,
}

pub async fn index() -> impl Responder {
    HttpResponse::Ok().json("Inference Server")
}

pub async fn inference(
    state: web::Data<AppState>,
    query: web::Query<InferenceQuery>,
) -> impl Responder {
    let url = query.into_inner().image_url;
    tracing::info!(url = %url, "Inference by URL");

    let result = match state.fetcher.fetch(&url).await {
        Ok(bytes) => state.pipeline.infer_async(bytes).await,
        Err(e) => Err(e),
    };

    respond(result.into())
}

pub async fn inference_file(state: web::Data<AppState>, payload: Multipart) -> impl Responder {
    let result = match read_upload(payload, state.max_upload_bytes).await {
        Ok(bytes) => {
            tracing::info!(bytes = bytes.len(), "Inference by upload");
            state.pipeline.infer_async(bytes).await
        }
        Err(e) => Err(e),
    };

    respond(result.into())
}

pub async fn inference_async(
    state: web::Data<AppState>,
    body: web::Json<AsyncInferenceRequest>,
) -> impl Responder {
    let AsyncInferenceRequest {
        image_url,
        submission_id,
    } = body.into_inner();

    tracing::info!(submission_id, url = %image_url, "Queued background verification");
    state.verifier.dispatch(image_url, submission_id);

    HttpResponse::Ok().json(MessageResponse {
        success: true,
        message: "processing",
    })
}

pub async fn pull_model(state: web::Data<AppState>) -> impl Responder {
    let ticket = match state.gate.try_begin() {
        Ok(ticket) => ticket,
        Err(e) => {
            tracing::warn!("Rejected model pull: {e}");
            return HttpResponse::Conflict().json(InferenceOutcome::failure(&e));
        }
    };

    let puller = state.puller.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = puller.pull(ticket).await {
            tracing::error!(kind = ?e.kind(), error = %e, "Model pull failed");
        }
    });

    HttpResponse::Ok().json(MessageResponse {
        success: true,
        message: "Model is downloading",
    })
}

pub async fn model_info(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ModelInfo {
        app_name: state.app_name.clone(),
        input_shape: state.pipeline.input_shape(),
        downloading: state.gate.is_downloading(),
    })
}

fn respond(outcome: InferenceOutcome) -> HttpResponse {
    if let Some(error) = &outcome.error {
        tracing::warn!(kind = ?outcome.kind, "Inference failed: {error}");
    }
    HttpResponse::Ok().json(outcome)
}

/// Collect the `file` field of a multipart upload.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>> {
    let upload_error = |e: actix_multipart::MultipartError| Error::Upload {
        reason: e.to_string(),
    };

    while let Some(mut field) = payload.try_next().await.map_err(upload_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(upload_error)? {
            if data.len() + chunk.len() > limit {
                return Err(Error::Upload {
                    reason: format!("file exceeds {limit} bytes"),
                });
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(data);
    }

    Err(Error::Upload {
        reason: format!("missing {UPLOAD_FIELD} field"),
    })
}
