pub mod handle;
pub mod logbook;
pub mod run;
pub mod stage;

use std::path::PathBuf;
use std::sync::Arc;

use image::GrayImage;
use log::{debug, info};
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::classifier::{Classification, ClassifierClient, ClassifierError, FailureKind};
use crate::config::{PipelineConfig, SimulatedLatency};
use crate::models::{GRID_SIZE, NormalizedVector, PixelBuffer, Prediction};
use crate::normalize::Normalizer;

pub use handle::PipelineHandle;
pub use logbook::{LogEntry, Severity};
pub use run::PipelineRun;
pub use stage::{PipelineStage, StageId, StageStatus};

/// Parameters announced by the simulated encryption stage. Nothing is
/// encrypted; they only appear in the run log.
const SIMULATED_SCHEME: &str = "CKKS";
const SIMULATED_POLY_MODULUS_DEGREE: u32 = 8192;
const SIMULATED_COEFF_MODULUS_BITS: [u32; 4] = [60, 40, 40, 60];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot {operation}: {reason}")]
    Precondition {
        operation: &'static str,
        reason: String,
    },

    #[error("{stage} stage failed: {reason}")]
    StageFailed { stage: StageId, reason: String },

    #[error("failed to write debug output: {0}")]
    DebugOutput(#[from] image::ImageError),
}

impl PipelineError {
    fn precondition(operation: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::Precondition {
            operation,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Preprocess and encrypt completed; ready to transmit
    Encrypted,
    /// Nothing drawn; a warning was logged and the run is still startable
    EmptyInput,
    /// The run was reset before the local stages finished
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransmitOutcome {
    Classified(Prediction),
    /// The run was reset while the request was in flight
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecryptOutcome {
    Decrypted(Prediction),
    /// The run was reset during the decrypt delay
    Discarded,
}

/// Work in progress for the local stages of one run
#[derive(Debug)]
pub struct StartTicket {
    run_id: u64,
    grid: GrayImage,
    vector: NormalizedVector,
    started: Instant,
}

/// Proof that `transmit`/`infer` were activated for a particular run
#[derive(Debug)]
pub struct TransmitTicket {
    run_id: u64,
    vector: NormalizedVector,
    started: Instant,
}

impl TransmitTicket {
    pub fn vector(&self) -> &NormalizedVector {
        &self.vector
    }
}

/// Proof that `decrypt` was activated for a particular run
#[derive(Debug)]
pub struct DecryptTicket {
    run_id: u64,
    prediction: Prediction,
    started: Instant,
}

/// Drives one run at a time through preprocess → encrypt → transmit → infer → decrypt.
///
/// Every stage that waits is split into `begin_*`/`finish_*` halves around a
/// ticket, so a caller holding the orchestrator behind a lock can release it
/// while waiting. A ticket from a run that has since been reset changes nothing.
pub struct Orchestrator<C> {
    client: Arc<C>,
    normalizer: Normalizer,
    latency: SimulatedLatency,
    /// Root directory for debug images, `None` when debug mode is off
    debug_dir: Option<PathBuf>,
    run: PipelineRun,
}

impl<C: ClassifierClient> Orchestrator<C> {
    pub fn new(client: C, config: &PipelineConfig) -> Self {
        Self {
            client: Arc::new(client),
            normalizer: Normalizer::from_config(&config.normalizer),
            latency: config.latency.clone(),
            debug_dir: None,
            run: PipelineRun::new(1),
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> anyhow::Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug_dir = Some(output_dir);

        Ok(self)
    }

    pub fn run(&self) -> &PipelineRun {
        &self.run
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn latency(&self) -> &SimulatedLatency {
        &self.latency
    }

    /// Preprocess the drawing and run the simulated encryption
    pub async fn start(&mut self, buffer: &PixelBuffer) -> Result<StartOutcome, PipelineError> {
        let Some(ticket) = self.begin_start(buffer)? else {
            return Ok(StartOutcome::EmptyInput);
        };
        sleep(self.latency.preprocess()).await;

        let Some(ticket) = self.begin_encrypt(ticket) else {
            return Ok(StartOutcome::Discarded);
        };
        sleep(self.latency.encrypt()).await;

        self.finish_start(ticket, buffer)
    }

    /// Activate `preprocess` and normalize the drawing. `None` means nothing
    /// was drawn: the stage is back to pending and a warning is logged.
    pub fn begin_start(&mut self, buffer: &PixelBuffer) -> Result<Option<StartTicket>, PipelineError> {
        if !self.run.is_initial() {
            return Err(PipelineError::precondition(
                "start",
                "the current run has already started, reset it first",
            ));
        }

        let started = Instant::now();
        self.run.stage_mut(StageId::Preprocess).activate();

        let Some(grid) = self.normalizer.grid(buffer) else {
            self.run.stage_mut(StageId::Preprocess).deactivate();
            self.run
                .push_log("Canvas is empty. Please draw a digit first.", Severity::Warning);
            return Ok(None);
        };
        let vector = NormalizedVector::from_grid(&grid);

        Ok(Some(StartTicket {
            run_id: self.run.id(),
            grid,
            vector,
            started,
        }))
    }

    /// Complete `preprocess` and activate the simulated encryption, which
    /// logs the would-be parameters
    pub fn begin_encrypt(&mut self, mut ticket: StartTicket) -> Option<StartTicket> {
        if !self.is_current(ticket.run_id) {
            return None;
        }

        self.run
            .stage_mut(StageId::Preprocess)
            .complete(ticket.started.elapsed());
        self.run.push_log(
            format!(
                "Drawing normalized to a {}x{} input vector ({} ink cells).",
                GRID_SIZE,
                GRID_SIZE,
                ticket.vector.ink_cells()
            ),
            Severity::Info,
        );

        ticket.started = Instant::now();
        self.run.stage_mut(StageId::Encrypt).activate();
        self.run.push_log(
            "Starting encryption process (simulated, no cryptography is applied)...",
            Severity::Info,
        );
        self.run.push_log(
            format!("Generating {} context parameters...", SIMULATED_SCHEME),
            Severity::Info,
        );
        self.run.push_log(
            format!("Poly Modulus Degree: {}", SIMULATED_POLY_MODULUS_DEGREE),
            Severity::Info,
        );
        self.run.push_log(
            format!("Coeff Modulus Sizes: {:?}", SIMULATED_COEFF_MODULUS_BITS),
            Severity::Info,
        );

        Some(ticket)
    }

    /// Keep the plain vector as the payload and complete `encrypt`
    pub fn finish_start(
        &mut self,
        ticket: StartTicket,
        buffer: &PixelBuffer,
    ) -> Result<StartOutcome, PipelineError> {
        if !self.is_current(ticket.run_id) {
            return Ok(StartOutcome::Discarded);
        }

        self.run.set_payload(ticket.vector);
        self.run
            .stage_mut(StageId::Encrypt)
            .complete(ticket.started.elapsed());
        self.run
            .push_log("Input vector successfully encrypted.", Severity::Success);
        self.run.push_log("Ciphertext generated.", Severity::Info);

        self.save_debug_output(buffer, &ticket.grid)?;

        Ok(StartOutcome::Encrypted)
    }

    /// Send the payload and wait for the classifier
    pub async fn advance_to_transmit(&mut self) -> Result<TransmitOutcome, PipelineError> {
        let ticket = self.begin_transmit()?;
        let client = Arc::clone(&self.client);

        let result = client.classify(ticket.vector()).await;
        if result.is_ok() {
            sleep(self.latency.inference()).await;
        }

        self.finish_transmit(ticket, result)
    }

    /// Activate `transmit` and `infer` and hand out the payload for the round trip
    pub fn begin_transmit(&mut self) -> Result<TransmitTicket, PipelineError> {
        const OP: &str = "transmit";

        if self.run.status(StageId::Encrypt) != StageStatus::Completed {
            return Err(PipelineError::precondition(
                OP,
                format!("encrypt is {}, not completed", self.run.status(StageId::Encrypt)),
            ));
        }
        if self.run.status(StageId::Transmit) != StageStatus::Pending {
            return Err(PipelineError::precondition(
                OP,
                format!("transmit is already {}", self.run.status(StageId::Transmit)),
            ));
        }
        let vector = self
            .run
            .payload()
            .cloned()
            .ok_or_else(|| PipelineError::precondition(OP, "no encrypted payload to send"))?;

        self.run.stage_mut(StageId::Transmit).activate();
        self.run.stage_mut(StageId::Infer).activate();
        self.run
            .push_log("Initiating secure connection to server...", Severity::Info);
        self.run
            .push_log("Uploading encrypted payload (Ciphertext)...", Severity::Info);

        Ok(TransmitTicket {
            run_id: self.run.id(),
            vector,
            started: Instant::now(),
        })
    }

    /// Apply the classifier's answer to the run that issued `ticket`.
    /// Answers for a run that has since been reset change nothing.
    pub fn finish_transmit(
        &mut self,
        ticket: TransmitTicket,
        result: Result<Classification, ClassifierError>,
    ) -> Result<TransmitOutcome, PipelineError> {
        if !self.is_current(ticket.run_id) {
            debug!(
                "discarding classifier response for run {} (current run is {})",
                ticket.run_id,
                self.run.id()
            );
            return Ok(TransmitOutcome::Discarded);
        }

        let elapsed = ticket.started.elapsed();

        let classification = match result {
            Ok(classification) => classification,
            Err(err) => return Err(self.record_transmit_failure(err, elapsed)),
        };

        self.run.push_log("Server received payload.", Severity::Info);
        self.run
            .push_log("Server computing Homomorphic Dot Product...", Severity::Info);
        self.run
            .push_log("Server computing Square Activation...", Severity::Info);

        let prediction = Prediction::new(classification.label, classification.confidence);
        self.run.set_prediction(prediction);
        self.run.stage_mut(StageId::Transmit).complete(elapsed);
        self.run.stage_mut(StageId::Infer).complete(elapsed);

        self.run
            .push_log("Computation complete. Result encrypted.", Severity::Info);
        self.run
            .push_log("Downloading encrypted result...", Severity::Success);

        Ok(TransmitOutcome::Classified(prediction))
    }

    fn record_transmit_failure(
        &mut self,
        err: ClassifierError,
        elapsed: std::time::Duration,
    ) -> PipelineError {
        let stage = match err.kind() {
            FailureKind::Transport => {
                // the upload never landed, so inference was never reached
                self.run.stage_mut(StageId::Transmit).fail();
                self.run.stage_mut(StageId::Infer).deactivate();
                self.run.push_log(
                    format!("Failed to communicate with server: {}", err),
                    Severity::Error,
                );
                StageId::Transmit
            }
            FailureKind::Service => {
                self.run.stage_mut(StageId::Transmit).complete(elapsed);
                self.run.stage_mut(StageId::Infer).fail();
                self.run.push_log(
                    format!("Server could not classify the payload: {}", err),
                    Severity::Error,
                );
                StageId::Infer
            }
        };

        PipelineError::StageFailed {
            stage,
            reason: err.to_string(),
        }
    }

    /// Simulated decryption of the classifier's answer
    pub async fn decrypt(&mut self) -> Result<Prediction, PipelineError> {
        let ticket = self.begin_decrypt()?;
        sleep(self.latency.decrypt()).await;

        match self.finish_decrypt(ticket) {
            DecryptOutcome::Decrypted(prediction) => Ok(prediction),
            DecryptOutcome::Discarded => Err(PipelineError::precondition(
                "decrypt",
                "the run was reset while decrypting",
            )),
        }
    }

    /// Activate `decrypt`. Every check runs before anything is changed.
    pub fn begin_decrypt(&mut self) -> Result<DecryptTicket, PipelineError> {
        const OP: &str = "decrypt";

        if self.run.status(StageId::Infer) != StageStatus::Completed {
            return Err(PipelineError::precondition(
                OP,
                format!("infer is {}, not completed", self.run.status(StageId::Infer)),
            ));
        }
        if self.run.status(StageId::Decrypt) != StageStatus::Pending {
            return Err(PipelineError::precondition(
                OP,
                format!("decrypt is already {}", self.run.status(StageId::Decrypt)),
            ));
        }
        let prediction = self
            .run
            .prediction()
            .ok_or_else(|| PipelineError::precondition(OP, "no result found"))?;

        self.run.stage_mut(StageId::Decrypt).activate();
        self.run.push_log(
            "Requesting private key for decryption (simulated)...",
            Severity::Info,
        );

        Ok(DecryptTicket {
            run_id: self.run.id(),
            prediction,
            started: Instant::now(),
        })
    }

    /// Complete `decrypt` and announce the result
    pub fn finish_decrypt(&mut self, ticket: DecryptTicket) -> DecryptOutcome {
        if !self.is_current(ticket.run_id) {
            return DecryptOutcome::Discarded;
        }
        let prediction = ticket.prediction;

        self.run.push_log("Decrypting result vector...", Severity::Info);
        self.run
            .stage_mut(StageId::Decrypt)
            .complete(ticket.started.elapsed());
        self.run.push_log("Decryption successful.", Severity::Success);
        if let Some(confidence) = prediction.confidence {
            self.run
                .push_log(format!("Confidence: {:.1}%", confidence), Severity::Info);
        }
        self.run.push_log(
            format!("Model Classification: {}", prediction.label),
            Severity::Success,
        );

        DecryptOutcome::Decrypted(prediction)
    }

    /// Throw the current run away and start a fresh one
    pub fn reset(&mut self) {
        let next = self.run.id() + 1;
        self.run = PipelineRun::new(next);
        info!("session reset, run {} ready for new input", next);
    }

    fn is_current(&self, run_id: u64) -> bool {
        run_id == self.run.id()
    }

    fn save_debug_output(&self, buffer: &PixelBuffer, grid: &GrayImage) -> Result<(), PipelineError> {
        let Some(debug_dir) = &self.debug_dir else {
            return Ok(());
        };

        let filename = format!("{:02}.png", self.run.id());

        let input_dir = debug_dir.join("00_input");
        std::fs::create_dir_all(&input_dir).map_err(image::ImageError::IoError)?;
        buffer.as_image().save(input_dir.join(&filename))?;

        let grid_dir = debug_dir.join("01_preprocess");
        std::fs::create_dir_all(&grid_dir).map_err(image::ImageError::IoError)?;
        grid.save(grid_dir.join(&filename))?;

        debug!("saved debug output 00_input/{0} and 01_preprocess/{0}", filename);

        Ok(())
    }
}
