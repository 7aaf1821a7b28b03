use crate::config::Config;
use rollcall_core::detector::DetectorError;
use rollcall_core::recognizer::RecognizerError;
use rollcall_core::{BoundingBox, DetectorOptions, Embedding, FaceDetector, FaceRecognizer, GrayImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// A detected face together with its embedding.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Anything that can find and embed faces in a grayscale image.
pub trait Embedder {
    /// Faces in `image`, highest detection confidence first.
    fn faces(&mut self, image: &GrayImage<'_>) -> Result<Vec<FaceSample>, PipelineError>;
}

/// SCRFD detection followed by ArcFace embedding.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    /// Load both models; fails fast when either file is missing.
    pub fn load(config: &Config) -> Result<Self, PipelineError> {
        let options = DetectorOptions {
            min_face_size: config.min_face_size,
            ..DetectorOptions::default()
        };
        let detector = FaceDetector::load(&config.detector_model_path(), options)?;
        let recognizer = FaceRecognizer::load(&config.recognizer_model_path())?;
        Ok(Self { detector, recognizer })
    }
}

impl Embedder for FacePipeline {
    fn faces(&mut self, image: &GrayImage<'_>) -> Result<Vec<FaceSample>, PipelineError> {
        let boxes = self.detector.detect(image)?;
        let mut samples = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match self.recognizer.extract(image, &bbox) {
                Ok(embedding) => samples.push(FaceSample { bbox, embedding }),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::debug!(confidence = bbox.confidence, "skipping face without landmarks");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(samples)
    }
}
