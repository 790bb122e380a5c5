use std::path::{Path, PathBuf};
use std::sync::Arc;

use dlib_face_recognition::{
    FaceDetector, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait, ImageMatrix,
    LandmarkPredictor, LandmarkPredictorTrait,
};
use image::RgbImage;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::debug;

use crate::errors::{AppError, Result};

pub const LANDMARK_MODEL_FILE: &str = "shape_predictor_68_face_landmarks.dat";
pub const ENCODER_MODEL_FILE: &str = "dlib_face_recognition_resnet_model_v1.dat";

/// Produces a fixed-length descriptor for the single face in an image.
pub trait FaceDescriptorBackend {
    fn describe(&self, image: &RgbImage) -> Result<Vec<f64>>;
}

type BackendFactory = Arc<dyn Fn() -> Result<Box<dyn FaceDescriptorBackend>> + Send + Sync>;

struct CompareJob {
    id_image: RgbImage,
    selfie_image: RgbImage,
    reply: oneshot::Sender<Result<f64>>,
}

/// Hosts the recognition backend on a dedicated inference thread. The load
/// happens exactly once, serialized across concurrent first callers; a failed
/// load is surfaced to the caller and retried on the next request. The
/// backend never leaves its thread.
pub struct FaceEngine {
    factory: BackendFactory,
    worker: OnceCell<mpsc::UnboundedSender<CompareJob>>,
}

impl FaceEngine {
    pub fn new(model_dir: PathBuf) -> Self {
        Self::with_backend(Arc::new(move || {
            DlibBackend::load(&model_dir)
                .map(|backend| Box::new(backend) as Box<dyn FaceDescriptorBackend>)
        }))
    }

    pub fn with_backend(factory: BackendFactory) -> Self {
        Self {
            factory,
            worker: OnceCell::new(),
        }
    }

    /// Idempotent "ensure model ready". The first caller spawns the inference
    /// thread and waits for its load result; everyone else observes the same
    /// outcome.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.sender().await.map(|_| ())
    }

    async fn sender(&self) -> Result<&mpsc::UnboundedSender<CompareJob>> {
        self.worker
            .get_or_try_init(|| async {
                let factory = self.factory.clone();
                let (ready_tx, ready_rx) = oneshot::channel();
                let (job_tx, job_rx) = mpsc::unbounded_channel();

                std::thread::Builder::new()
                    .name("face-engine".to_string())
                    .spawn(move || worker_loop(factory, ready_tx, job_rx))
                    .map_err(|e| {
                        AppError::ModelUnavailable(format!(
                            "failed to spawn inference thread: {}",
                            e
                        ))
                    })?;

                ready_rx.await.map_err(|_| {
                    AppError::ModelUnavailable(
                        "inference thread exited during startup".to_string(),
                    )
                })??;

                Ok(job_tx)
            })
            .await
    }

    /// Extracts a descriptor from each fully resolved raster and returns the
    /// Euclidean distance between them.
    pub async fn compare(&self, id_image: RgbImage, selfie_image: RgbImage) -> Result<f64> {
        let sender = self.sender().await?;
        let (reply_tx, reply_rx) = oneshot::channel();

        sender
            .send(CompareJob {
                id_image,
                selfie_image,
                reply: reply_tx,
            })
            .map_err(|_| AppError::ModelUnavailable("inference thread is gone".to_string()))?;

        reply_rx.await.map_err(|_| {
            AppError::ModelUnavailable("inference thread dropped the request".to_string())
        })?
    }
}

fn worker_loop(
    factory: BackendFactory,
    ready_tx: oneshot::Sender<Result<()>>,
    mut jobs: mpsc::UnboundedReceiver<CompareJob>,
) {
    let backend = match factory() {
        Ok(backend) => {
            let _ = ready_tx.send(Ok(()));
            backend
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    while let Some(job) = jobs.blocking_recv() {
        let result = compare_images(backend.as_ref(), &job.id_image, &job.selfie_image);
        let _ = job.reply.send(result);
    }
}

fn compare_images(
    backend: &dyn FaceDescriptorBackend,
    id_image: &RgbImage,
    selfie_image: &RgbImage,
) -> Result<f64> {
    let id_descriptor = backend.describe(id_image)?;
    let selfie_descriptor = backend.describe(selfie_image)?;
    Ok(euclidean_distance(&id_descriptor, &selfie_descriptor))
}

pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(l, r)| (l - r) * (l - r))
        .sum::<f64>()
        .sqrt()
}

pub struct DlibBackend {
    detector: FaceDetector,
    predictor: LandmarkPredictor,
    encoder: FaceEncoderNetwork,
}

impl DlibBackend {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let landmark_path = model_dir.join(LANDMARK_MODEL_FILE);
        debug!(path = %landmark_path.display(), "loading landmark model");
        let predictor = LandmarkPredictor::open(&landmark_path).map_err(|message| {
            AppError::ModelUnavailable(format!("{}: {}", landmark_path.display(), message))
        })?;

        let encoder_path = model_dir.join(ENCODER_MODEL_FILE);
        debug!(path = %encoder_path.display(), "loading encoder model");
        let encoder = FaceEncoderNetwork::open(&encoder_path).map_err(|message| {
            AppError::ModelUnavailable(format!("{}: {}", encoder_path.display(), message))
        })?;

        let detector = FaceDetector::new();

        Ok(Self {
            detector,
            predictor,
            encoder,
        })
    }
}

impl FaceDescriptorBackend for DlibBackend {
    fn describe(&self, image: &RgbImage) -> Result<Vec<f64>> {
        let matrix = ImageMatrix::from_image(image);
        let locations = self.detector.face_locations(&matrix);
        let rect = match locations.iter().next() {
            Some(rect) => rect,
            None => return Err(AppError::NoFaceDetected),
        };

        let landmarks = self.predictor.face_landmarks(&matrix, rect);
        let encodings = self.encoder.get_face_encodings(&matrix, &[landmarks], 0);
        let encoding = encodings.iter().next().ok_or(AppError::NoFaceDetected)?;
        Ok(encoding.as_ref().to_vec())
    }
}
