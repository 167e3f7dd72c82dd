//! Image classification pipeline: bytes in, scores and a decision out.

mod decision;
mod outcome;

pub use decision::{Decision, DECISION_THRESHOLD};
pub use outcome::InferenceOutcome;

use std::sync::Arc;

use ::image::DynamicImage;

use crate::error::{Error, Result};
use crate::image::{self, InputShape};
use crate::model::Predictor;

/// Raw classifier output for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// First batch row of the model output, in model order.
    pub scores: Vec<f32>,
}

impl Prediction {
    /// Decision from the first score.
    ///
    /// Only the first score is read, which assumes a single-score binary
    /// classifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyOutput`] if there are no scores.
    pub fn decision(&self) -> Result<Decision> {
        self.scores
            .first()
            .map(|&score| Decision::from_score(score))
            .ok_or(Error::EmptyOutput)
    }
}

/// Decode, resize, normalize, predict.
#[derive(Clone)]
pub struct Pipeline {
    predictor: Arc<dyn Predictor>,
}

impl Pipeline {
    #[must_use]
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self { predictor }
    }

    /// Input shape the underlying model expects.
    #[must_use]
    pub fn input_shape(&self) -> InputShape {
        self.predictor.input_shape()
    }

    /// Run the whole pipeline on an encoded image.
    ///
    /// Payloads that do not decode never reach the model. If the model is
    /// reloaded with a different input shape between resizing and predicting,
    /// the image is resized again for the new shape and predicted once more.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or prediction fails.
    pub fn infer(&self, bytes: &[u8]) -> Result<Prediction> {
        let img = image::decode_image(bytes)?;
        let shape = self.predictor.input_shape();

        match self.predict_at(&img, shape) {
            Err(Error::ShapeMismatch { .. }) if self.predictor.input_shape() != shape => {
                let reloaded = self.predictor.input_shape();
                tracing::debug!(
                    old = ?shape,
                    new = ?reloaded,
                    "Model input changed during prediction, resizing again"
                );
                self.predict_at(&img, reloaded)
            }
            result => result,
        }
    }

    fn predict_at(&self, img: &DynamicImage, shape: InputShape) -> Result<Prediction> {
        let tensor = image::image_to_tensor(img, shape)?;

        tracing::debug!(shape = ?tensor.shape(), "Running prediction");
        let scores = self.predictor.predict(&tensor)?;

        Ok(Prediction { scores })
    }

    /// [`Pipeline::infer`] on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline fails or its worker dies.
    pub async fn infer_async(&self, bytes: Vec<u8>) -> Result<Prediction> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.infer(&bytes))
            .await
            .map_err(|e| Error::Worker(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use ::image::{ImageFormat, Rgb, RgbImage};

    use super::*;
    use crate::image::ImageTensor;

    /// Predictor that records what it was fed and returns fixed scores.
    pub(crate) struct FakePredictor {
        pub shape: InputShape,
        pub scores: Vec<f32>,
        pub calls: AtomicUsize,
        pub last_shape: Mutex<Option<Vec<usize>>>,
    }

    impl FakePredictor {
        pub(crate) fn new(scores: Vec<f32>) -> Self {
            Self {
                shape: InputShape::new(64, 64, 3).unwrap(),
                scores,
                calls: AtomicUsize::new(0),
                last_shape: Mutex::new(None),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Predictor for FakePredictor {
        fn input_shape(&self) -> InputShape {
            self.shape
        }

        fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_shape.lock().unwrap() = Some(input.shape().to_vec());
            Ok(self.scores.clone())
        }
    }

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn input_shape(&self) -> InputShape {
            InputShape::new(8, 8, 3).unwrap()
        }

        fn predict(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
            Err(Error::ShapeMismatch {
                expected: "[1, 8, 8, 3]".to_string(),
                actual: "[1, 3, 8, 8]".to_string(),
            })
        }
    }

    pub(crate) fn red_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([255, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_infer_feeds_declared_shape() {
        let fake = Arc::new(FakePredictor::new(vec![0.9, 0.1]));
        let pipeline = Pipeline::new(fake.clone());

        let prediction = pipeline.infer(&red_png(10, 10)).unwrap();

        assert_eq!(prediction.scores, vec![0.9, 0.1]);
        assert_eq!(fake.calls(), 1);
        assert_eq!(
            fake.last_shape.lock().unwrap().as_deref(),
            Some(&[1, 64, 64, 3][..])
        );
    }

    #[test]
    fn test_garbage_never_reaches_model() {
        let fake = Arc::new(FakePredictor::new(vec![0.9]));
        let pipeline = Pipeline::new(fake.clone());

        let outcome = InferenceOutcome::from(pipeline.infer(b"<html>not found</html>"));

        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(crate::error::ErrorKind::Decode));
        assert_eq!(fake.calls(), 0);
    }

    #[test]
    fn test_prediction_failure_is_structured() {
        let pipeline = Pipeline::new(Arc::new(FailingPredictor));

        let outcome = InferenceOutcome::from(pipeline.infer(&red_png(3, 3)));

        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(crate::error::ErrorKind::Prediction));
        assert!(outcome.error.unwrap().contains("shape mismatch"));
    }

    #[test]
    fn test_decision_from_first_score() {
        let verified = Prediction {
            scores: vec![0.7, 0.1],
        };
        let rejected = Prediction { scores: vec![0.5] };

        assert_eq!(verified.decision().unwrap(), Decision::Verified);
        assert_eq!(rejected.decision().unwrap(), Decision::RejectedByMl);
        assert!(matches!(
            Prediction { scores: vec![] }.decision(),
            Err(Error::EmptyOutput)
        ));
    }

    /// Predictor reloaded with a new input shape right after its shape is
    /// first read, so the first tensor it receives is stale.
    struct ReloadingPredictor {
        reads: AtomicUsize,
        calls: AtomicUsize,
        last_shape: Mutex<Option<Vec<usize>>>,
    }

    impl ReloadingPredictor {
        fn reloaded_shape() -> InputShape {
            InputShape::new(32, 48, 3).unwrap()
        }
    }

    impl Predictor for ReloadingPredictor {
        fn input_shape(&self) -> InputShape {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                InputShape::new(64, 64, 3).unwrap()
            } else {
                Self::reloaded_shape()
            }
        }

        fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (b, w, h, c) = Self::reloaded_shape().tensor_dims();
            let expected = [b, w, h, c];
            if input.shape() != &expected[..] {
                return Err(Error::ShapeMismatch {
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", input.shape()),
                });
            }
            *self.last_shape.lock().unwrap() = Some(input.shape().to_vec());
            Ok(vec![0.9])
        }
    }

    #[test]
    fn test_infer_resizes_again_after_reload() {
        let reloading = Arc::new(ReloadingPredictor {
            reads: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            last_shape: Mutex::new(None),
        });
        let pipeline = Pipeline::new(reloading.clone());

        let prediction = pipeline.infer(&red_png(10, 10)).unwrap();

        assert_eq!(prediction.scores, vec![0.9]);
        assert_eq!(reloading.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            reloading.last_shape.lock().unwrap().as_deref(),
            Some(&[1, 32, 48, 3][..])
        );
    }

    #[test]
    fn test_shape_mismatch_without_reload_is_not_retried() {
        let pipeline = Pipeline::new(Arc::new(FailingPredictor));

        let err = pipeline.infer(&red_png(3, 3)).unwrap_err();

        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[actix_web::test]
    async fn test_infer_async() {
        let fake = Arc::new(FakePredictor::new(vec![0.2]));
        let pipeline = Pipeline::new(fake.clone());

        let prediction = pipeline.infer_async(red_png(5, 7)).await.unwrap();

        assert_eq!(prediction.decision().unwrap(), Decision::RejectedByMl);
        assert_eq!(fake.calls(), 1);
    }
}
