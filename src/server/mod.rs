//! HTTP surface of the inference server.

mod handlers;

use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use crate::config::Settings;
use crate::error::Result;
use crate::fetch::ImageFetcher;
use crate::model::{DownloadGate, ModelPuller, Predictor};
use crate::pipeline::Pipeline;
use crate::report::BackendReporter;
use crate::verify::Verifier;

/// Everything the handlers share. Cloned per worker; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub pipeline: Pipeline,
    pub fetcher: ImageFetcher,
    pub verifier: Verifier,
    pub gate: DownloadGate,
    pub puller: ModelPuller,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the services around an already loaded model.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(settings: &Settings, predictor: Arc<dyn Predictor>) -> Result<Self> {
        let pipeline = Pipeline::new(Arc::clone(&predictor));
        let fetcher = ImageFetcher::new(settings.http.fetch_timeout())?;
        let reporter =
            BackendReporter::new(&settings.backend_endpoint, settings.http.report_timeout())?;
        let verifier = Verifier::new(pipeline.clone(), fetcher.clone(), reporter);
        let puller = ModelPuller::new(settings, predictor)?;

        Ok(Self {
            app_name: settings.app_name.clone(),
            pipeline,
            fetcher,
            verifier,
            gate: DownloadGate::new(),
            puller,
            max_upload_bytes: settings.server.max_upload_bytes,
        })
    }
}

/// Register every route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::index))
        .route("/inference", web::post().to(handlers::inference))
        .route("/inference-file", web::post().to(handlers::inference_file))
        .route("/inference-async", web::post().to(handlers::inference_async))
        .route("/pull-model", web::get().to(handlers::pull_model))
        .route("/model-info", web::get().to(handlers::model_info));
}

/// Serve until the process is stopped.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn run(settings: &Settings, state: AppState) -> std::io::Result<()> {
    let data = web::Data::new(state);
    let bind_address = settings.bind_address();

    tracing::info!(
        host = %bind_address.0,
        port = bind_address.1,
        backend = %settings.backend_endpoint,
        "Serving {}",
        settings.app_name
    );

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(data.clone())
            .configure(configure)
    });

    if settings.server.workers > 0 {
        server = server.workers(settings.server.workers);
    }

    server.bind(bind_address)?.run().await
}
