use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::sleep;

use super::{
    DecryptOutcome, Orchestrator, PipelineError, PipelineRun, StartOutcome, TransmitOutcome,
};
use crate::classifier::ClassifierClient;
use crate::models::PixelBuffer;

/// Cloneable access to one orchestrator from several UI callbacks.
///
/// The lock is released for every simulated delay and for the classifier
/// round trip, so `reset` takes effect at once; whatever the interrupted
/// stage produces afterwards is dropped.
pub struct PipelineHandle<C> {
    inner: Arc<Mutex<Orchestrator<C>>>,
}

impl<C> Clone for PipelineHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ClassifierClient> PipelineHandle<C> {
    pub fn new(orchestrator: Orchestrator<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(orchestrator)),
        }
    }

    pub async fn start(&self, buffer: &PixelBuffer) -> Result<StartOutcome, PipelineError> {
        let (ticket, latency) = {
            let mut orchestrator = self.inner.lock().await;
            let Some(ticket) = orchestrator.begin_start(buffer)? else {
                return Ok(StartOutcome::EmptyInput);
            };
            (ticket, orchestrator.latency().clone())
        };
        sleep(latency.preprocess()).await;

        let Some(ticket) = self.inner.lock().await.begin_encrypt(ticket) else {
            return Ok(StartOutcome::Discarded);
        };
        sleep(latency.encrypt()).await;

        self.inner.lock().await.finish_start(ticket, buffer)
    }

    pub async fn advance_to_transmit(&self) -> Result<TransmitOutcome, PipelineError> {
        let (ticket, client, inference) = {
            let mut orchestrator = self.inner.lock().await;
            let ticket = orchestrator.begin_transmit()?;
            (
                ticket,
                Arc::clone(orchestrator.client()),
                orchestrator.latency().inference(),
            )
        };

        let result = client.classify(ticket.vector()).await;
        if result.is_ok() {
            sleep(inference).await;
        }

        self.inner.lock().await.finish_transmit(ticket, result)
    }

    pub async fn decrypt(&self) -> Result<DecryptOutcome, PipelineError> {
        let (ticket, delay) = {
            let mut orchestrator = self.inner.lock().await;
            (orchestrator.begin_decrypt()?, orchestrator.latency().decrypt())
        };
        sleep(delay).await;

        Ok(self.inner.lock().await.finish_decrypt(ticket))
    }

    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }

    /// Copy of the current run for display
    pub async fn snapshot(&self) -> PipelineRun {
        self.inner.lock().await.run().clone()
    }
}
