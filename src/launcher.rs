//! Application launcher — starts the embedded application and owns the
//! write-back channel.
//!
//! The application receives the serialized identity as its launch flags and
//! a [`WriteBack`] sender. Every record it sends replaces the stored identity
//! in full, in the order sent. The write-back task runs until the
//! application has dropped every sender.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bootstrap::BootState;
use crate::error::AppError;
use crate::record::IdentityRecord;
use crate::store::IdentityStore;

pub type AppFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// An embedded application that can be launched once.
pub trait Application: Send {
    fn name(&self) -> &str;

    /// Start the application. `flags` is the serialized identity at launch
    /// time. The returned future completes when the application exits.
    fn launch(
        self: Box<Self>,
        flags: Option<String>,
        updates: WriteBack,
        shutdown: CancellationToken,
    ) -> AppFuture;
}

/// Cloneable sending end of the write-back channel.
#[derive(Clone)]
pub struct WriteBack {
    tx: mpsc::Sender<IdentityRecord>,
}

impl WriteBack {
    /// Queue `record` for persistence. Fails only if the write-back task
    /// has stopped.
    pub async fn send(&self, record: IdentityRecord) -> Result<(), AppError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| AppError::Identity("write-back channel closed".into()))
    }

    /// Unattached channel pair for driving an application by hand.
    #[cfg(test)]
    pub(crate) fn channel(buffer: usize) -> (Self, mpsc::Receiver<IdentityRecord>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

/// Handles for a launched application.
pub struct Running {
    app: JoinHandle<Result<(), AppError>>,
    write_back: JoinHandle<u64>,
}

impl Running {
    /// Wait for the application to exit and the write-back queue to drain.
    /// Returns the number of records persisted.
    pub async fn wait(self) -> Result<u64, AppError> {
        let app_result = self
            .app
            .await
            .map_err(|e| AppError::Identity(format!("application task failed: {e}")))?;
        let saved = self
            .write_back
            .await
            .map_err(|e| AppError::Identity(format!("write-back task failed: {e}")))?;
        app_result?;
        Ok(saved)
    }
}

/// Launch `app` with `record` and start the write-back task.
///
/// Must be called from within a tokio runtime.
pub fn launch(
    app: Box<dyn Application>,
    record: &IdentityRecord,
    store: IdentityStore,
    buffer: usize,
    shutdown: CancellationToken,
) -> Result<Running, AppError> {
    let flags = record.to_json()?;
    let (tx, rx) = mpsc::channel(buffer.max(1));

    info!(app = %app.name(), player_id = %record.player_id, state = %BootState::Running, "launching application");

    let write_back = tokio::spawn(run_write_back(rx, store));
    let app = tokio::spawn(app.launch(Some(flags), WriteBack { tx }, shutdown));

    Ok(Running { app, write_back })
}

async fn run_write_back(mut rx: mpsc::Receiver<IdentityRecord>, store: IdentityStore) -> u64 {
    let mut saved = 0u64;
    while let Some(record) = rx.recv().await {
        let raw = match record.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("dropping identity update: {e}");
                continue;
            }
        };
        match store.save(&raw) {
            Ok(()) => {
                saved += 1;
                debug!(player_id = %record.player_id, "identity update persisted");
            }
            Err(e) => warn!(player_id = %record.player_id, "identity update not persisted: {e}"),
        }
    }
    debug!(saved, "write-back channel closed");
    saved
}
