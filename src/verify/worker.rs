//! Background verification
//!
//! Each submitted artifact is verified on its own thread. Reports come back
//! over a channel tagged with the session that produced the artifact, so the
//! receiver can drop reports for sessions it no longer cares about.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::capture::artifact::CaptureArtifact;
use crate::error::{BinauralError, Result};
use crate::session::SessionId;
use crate::verify::{FrequencyVerifier, VerificationResult};

/// Outcome of verifying one artifact
#[derive(Debug)]
pub struct VerificationReport {
    pub session_id: SessionId,
    /// The artifact that was verified
    pub artifact: Arc<CaptureArtifact>,
    /// `Ok(None)` when the artifact had no target to check
    pub outcome: Result<Option<VerificationResult>>,
}

/// Verifications allowed to run at once
pub const DEFAULT_MAX_PENDING: usize = 4;

/// Runs verifications off the rendering thread
#[derive(Debug)]
pub struct VerificationWorker {
    verifier: FrequencyVerifier,
    max_pending: usize,
    tx: Sender<VerificationReport>,
    rx: Receiver<VerificationReport>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for VerificationWorker {
    fn default() -> Self {
        Self::new(FrequencyVerifier::new())
    }
}

impl VerificationWorker {
    pub fn new(verifier: FrequencyVerifier) -> Self {
        Self::with_max_pending(verifier, DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(verifier: FrequencyVerifier, max_pending: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            verifier,
            max_pending,
            tx,
            rx,
            handles: Vec::new(),
        }
    }

    /// Start verifying an artifact in the background
    ///
    /// Fails when `max_pending` verifications are already running or the
    /// thread cannot be spawned; no report will arrive for the artifact.
    pub fn submit(&mut self, artifact: Arc<CaptureArtifact>) -> Result<()> {
        self.handles.retain(|h| !h.is_finished());
        if self.handles.len() >= self.max_pending {
            warn!(
                "[VERIFY] {} verification(s) running, rejecting session {}",
                self.handles.len(),
                artifact.session_id
            );
            return Err(BinauralError::InvalidState {
                operation: "verify",
                state: format!("{} verification(s) are running", self.handles.len()),
            });
        }

        let verifier = self.verifier;
        let tx = self.tx.clone();
        let session_id = artifact.session_id;
        debug!("[VERIFY] Queued session {}", session_id);

        let spawned = thread::Builder::new()
            .name(format!("verify-{}", session_id))
            .spawn(move || {
                let outcome = verifier.verify(&artifact);
                let report = VerificationReport {
                    session_id,
                    artifact,
                    outcome,
                };
                // Receiver gone means the controller was dropped
                let _ = tx.send(report);
            });

        match spawned {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(())
            }
            Err(e) => {
                warn!("[VERIFY] Could not spawn verification thread: {}", e);
                Err(BinauralError::Io(e))
            }
        }
    }

    /// Next finished report, if any
    pub fn try_recv(&self) -> Option<VerificationReport> {
        match self.rx.try_recv() {
            Ok(report) => Some(report),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next report
    pub fn recv_timeout(&self, timeout: Duration) -> Option<VerificationReport> {
        match self.rx.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Verifications still running
    pub fn pending(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}
