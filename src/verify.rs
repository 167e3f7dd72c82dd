//! Fire-and-forget verification: fetch, classify, report.

use crate::error::Result;
use crate::fetch::ImageFetcher;
use crate::pipeline::{Decision, Pipeline};
use crate::report::BackendReporter;

/// Runs the async-reporting variant of the pipeline.
#[derive(Clone)]
pub struct Verifier {
    pipeline: Pipeline,
    fetcher: ImageFetcher,
    reporter: BackendReporter,
}

impl Verifier {
    #[must_use]
    pub fn new(pipeline: Pipeline, fetcher: ImageFetcher, reporter: BackendReporter) -> Self {
        Self {
            pipeline,
            fetcher,
            reporter,
        }
    }

    /// Classify the image at `image_url` and report the decision for `submission_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; nothing is reported in that case
    /// unless the failure is in the report itself.
    pub async fn verify(&self, image_url: &str, submission_id: i64) -> Result<Decision> {
        let bytes = self.fetcher.fetch(image_url).await?;
        let prediction = self.pipeline.infer_async(bytes).await?;
        let decision = prediction.decision()?;

        tracing::info!(
            submission_id,
            score = prediction.scores[0],
            decision = %decision,
            "Submission classified"
        );

        self.reporter.report(submission_id, decision).await?;
        Ok(decision)
    }

    /// Run [`Verifier::verify`] in the background. Failures are only logged.
    pub fn dispatch(&self, image_url: String, submission_id: i64) {
        let verifier = self.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = verifier.verify(&image_url, submission_id).await {
                tracing::error!(
                    submission_id,
                    url = %image_url,
                    kind = ?e.kind(),
                    error = %e,
                    "Background verification failed"
                );
            }
        });
    }
}
