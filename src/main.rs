use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;

use leafdoc::classifier::OnnxClassifier;
use leafdoc::config::AppConfig;
use leafdoc::handlers::{self, UploadLimit};
use leafdoc::knowledge::KnowledgeBase;
use leafdoc::logging::init_logging;
use leafdoc::pipeline::{ConfidenceGate, InferencePipeline};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("loading configuration")?;
    init_logging(&config.logging);

    let knowledge = match &config.knowledge_base.path {
        Some(path) => KnowledgeBase::from_json_file(path)?,
        None => KnowledgeBase::builtin(),
    };
    let missing = knowledge.missing_treatments();
    if !missing.is_empty() {
        tracing::warn!(?missing, "Labels without a treatment entry");
    }

    let classifier = OnnxClassifier::load(&config.model.path)
        .with_context(|| format!("loading model {}", config.model.path))?;

    let pipeline = web::Data::new(InferencePipeline::new(
        Arc::new(classifier),
        Arc::new(knowledge),
        ConfidenceGate::new(config.model.confidence_threshold),
    ));
    pipeline
        .check_vocabulary()
        .context("knowledge base does not match the model")?;
    let limit = web::Data::new(UploadLimit(config.upload.max_bytes));

    tracing::info!(
        classes = pipeline.knowledge().len(),
        threshold = config.model.confidence_threshold,
        "Server running at http://{}:{}",
        config.server.host,
        config.server.port
    );

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(handlers::cors())
            .app_data(pipeline.clone())
            .app_data(limit.clone())
            .configure(handlers::configure)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server
        .bind((config.server.host.as_str(), config.server.port))?
        .run()
        .await?;

    Ok(())
}
