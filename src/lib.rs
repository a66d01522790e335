pub mod classifier;
pub mod config;
pub mod models;
pub mod normalize;
pub mod pipeline;

pub use classifier::{Classification, ClassifierClient, ClassifierError, HttpClassifier};
pub use config::PipelineConfig;
pub use models::{BoundingBox, NormalizedVector, PixelBuffer, Prediction};
pub use normalize::{Normalized, Normalizer, normalize};
pub use pipeline::{
    DecryptOutcome, LogEntry, Orchestrator, PipelineError, PipelineHandle, PipelineRun, PipelineStage,
    Severity, StageId, StageStatus, StartOutcome, TransmitOutcome,
};
