use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::error::{ApiError, PredictError};
use crate::models::{DiagnosisResponse, HealthResponse, InferenceOutcome, WelcomeResponse};
use crate::pipeline::InferencePipeline;

/// Largest accepted upload, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

/// Registers the public routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/predict").route(web::post().to(predict)));
}

/// Public API: every origin, method and header is allowed.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(WelcomeResponse {
        message: "Welcome to the Smart Farming Plant Disease Prediction API!",
    })
}

pub async fn health(pipeline: web::Data<InferencePipeline>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        classes: pipeline.knowledge().len(),
        confidence_threshold: pipeline.gate().threshold(),
    })
}

#[tracing::instrument(name = "predict", skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn predict(
    pipeline: web::Data<InferencePipeline>,
    limit: web::Data<UploadLimit>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let upload = read_upload(&mut payload, limit.0).await?;
    tracing::info!(
        filename = %upload.filename,
        size = upload.bytes.len(),
        "Received upload"
    );

    // Decoding and inference are CPU bound; keep them off the async workers.
    let pipeline = pipeline.into_inner();
    let outcome = web::block(move || pipeline.run(&upload.filename, &upload.bytes))
        .await
        .map_err(|e| {
            tracing::error!("Inference task failed: {}", e);
            PredictError::internal(e.to_string())
        })?
        .map_err(|e| {
            match &e {
                PredictError::Internal(message) => tracing::error!("Prediction failed: {}", message),
                other => tracing::info!("Prediction refused: {}", other),
            }
            e
        })?;

    match outcome {
        InferenceOutcome::Success {
            disease,
            recommendation,
        } => {
            tracing::info!(%disease, "Diagnosis complete");
            Ok(HttpResponse::Ok().json(DiagnosisResponse {
                disease,
                recommendation,
            }))
        }
        InferenceOutcome::Rejected { reason } => {
            tracing::info!(%reason, "Prediction rejected");
            Err(PredictError::LowConfidence.into())
        }
    }
}

/// Pulls the `file` part out of the form, skipping any other fields.
async fn read_upload(payload: &mut Multipart, max_bytes: usize) -> Result<Upload, ApiError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::Multipart(e.to_string()))?;

        // A `file` part without a filename is a plain form value, not an upload.
        let filename = {
            let disposition = field.content_disposition();
            match (disposition.get_name(), disposition.get_filename()) {
                (Some("file"), Some(filename)) => Some(filename.to_string()),
                _ => None,
            }
        };

        let Some(filename) = filename else {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
            }
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
            if bytes.len() + data.len() > max_bytes {
                return Err(ApiError::PayloadTooLarge(max_bytes));
            }
            bytes.extend_from_slice(&data);
        }

        return Ok(Upload { filename, bytes });
    }

    Err(ApiError::MissingFile)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use serde_json::Value;

    use super::*;
    use crate::classifier::Classifier;
    use crate::pipeline::testing::{pipeline, FailingClassifier, FixedClassifier};
    use crate::preprocess::fixtures;

    const BOUNDARY: &str = "leafdoc-test-boundary";

    fn form(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match filename {
                Some(filename) => {
                    format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
                }
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(parts: &[(&str, Option<&str>, &[u8])]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/predict")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(form(parts))
    }

    macro_rules! app {
        ($classifier:expr) => {
            app!($classifier, 10 * 1024 * 1024)
        };
        ($classifier:expr, $limit:expr) => {
            test::init_service(
                App::new()
                    .wrap(cors())
                    .app_data(web::Data::new(pipeline($classifier)))
                    .app_data(web::Data::new(UploadLimit($limit)))
                    .configure(configure),
            )
            .await
        };
    }

    fn confident(index: usize, confidence: f32) -> Arc<dyn Classifier> {
        Arc::new(FixedClassifier::peaked(index, confidence))
    }

    #[actix_web::test]
    async fn root_welcomes() {
        let app = app!(confident(0, 0.95));
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("Welcome"));
    }

    #[actix_web::test]
    async fn health_reports_vocabulary() {
        let app = app!(confident(0, 0.95));
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["classes"], 38);
    }

    #[actix_web::test]
    async fn diagnoses_apple_scab() {
        let app = app!(confident(0, 0.95));
        let image = fixtures::jpeg(300, 220);
        let req = upload_request(&[("file", Some("leaf_apple_scab.jpg"), image.as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            serde_json::json!({
                "Disease": "Apple___scab",
                "Recommendation": "Captan 50% WP spray",
            })
        );
    }

    #[actix_web::test]
    async fn other_fields_are_ignored() {
        let app = app!(confident(22, 0.97));
        let image = fixtures::png(64, 64);
        let req = upload_request(&[
            ("note", None, b"hello".as_slice()),
            ("file", Some("LEAF.PNG"), image.as_slice()),
        ]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["Disease"], "Potato___healthy");
        assert_eq!(body["Recommendation"], "No treatment needed");
    }

    #[actix_web::test]
    async fn corrupt_image_is_rejected() {
        let app = app!(confident(0, 0.95));
        let text = b"This is not an image";
        let req = upload_request(&[("file", Some("notes.png"), text.as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({ "error": "Invalid or corrupted image file." }));
    }

    #[actix_web::test]
    async fn low_confidence_is_rejected() {
        let app = app!(confident(5, 0.2));
        let image = fixtures::jpeg(128, 128);
        let req = upload_request(&[("file", Some("random_photo.jpg"), image.as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        let message = body["error"].as_str().unwrap().to_lowercase();
        assert!(message.contains("low confidence"), "{message}");
        assert_eq!(body["error"], PredictError::LowConfidence.to_string());
    }

    #[actix_web::test]
    async fn unsupported_type_skips_decoding() {
        let classifier = Arc::new(FixedClassifier::peaked(0, 0.95));
        let app = app!(classifier.clone());
        let image = fixtures::png(16, 16);
        let req = upload_request(&[("file", Some("leaf.gif"), image.as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            serde_json::json!({ "error": "Only .jpg, .jpeg, and .png files are supported." })
        );
        assert_eq!(classifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn file_field_without_filename_is_unprocessable() {
        let classifier = Arc::new(FixedClassifier::peaked(0, 0.95));
        let app = app!(classifier.clone());
        let req = upload_request(&[("file", None, b"leaf.png".as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({ "error": "Field 'file' is required." }));
        assert_eq!(classifier.call_count(), 0);
    }

    #[actix_web::test]
    async fn empty_filename_is_unsupported() {
        let app = app!(confident(0, 0.95));
        let image = fixtures::png(16, 16);
        let req = upload_request(&[("file", Some(""), image.as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn missing_file_field_is_unprocessable() {
        let app = app!(confident(0, 0.95));
        let req = upload_request(&[("note", None, b"no image here".as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn empty_request_is_unprocessable() {
        let app = app!(confident(0, 0.95));
        let req = test::TestRequest::post().uri("/predict").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn oversized_upload_is_refused() {
        let app = app!(confident(0, 0.95), 64);
        let image = fixtures::png(128, 128);
        let req = upload_request(&[("file", Some("leaf.png"), image.as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_web::test]
    async fn classifier_failure_is_internal_error() {
        let app = app!(Arc::new(FailingClassifier));
        let image = fixtures::png(32, 32);
        let req = upload_request(&[("file", Some("leaf.png"), image.as_slice())]).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Model inference failed: out of memory");
    }

    #[actix_web::test]
    async fn cors_allows_any_origin() {
        let app = app!(confident(0, 0.95));
        let req = test::TestRequest::get()
            .uri("/")
            .insert_header((header::ORIGIN, "http://farm.example"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
