use crate::core::{DocumentKey, DocumentKind, PhantomError, Result};
use crate::host::{DocumentRegistry, Notifier, WorldContext};
use crate::hydration::HydrationCoordinator;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    pub restored: Vec<DocumentKey>,
    pub failed: Vec<(DocumentKey, PhantomError)>,
}

impl RecoveryReport {
    pub fn attempted(&self) -> usize {
        self.restored.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Forces every phantom of both classes back to full.
///
/// Documents are restored one at a time through the hydration gate, so a
/// recovery never races a hydration already in flight. A failing document
/// is recorded and skipped.
pub struct Exorcist {
    coordinator: Arc<HydrationCoordinator>,
    registry: Arc<dyn DocumentRegistry>,
    world: Arc<dyn WorldContext>,
    notifier: Arc<dyn Notifier>,
}

impl Exorcist {
    pub fn new(
        coordinator: Arc<HydrationCoordinator>,
        registry: Arc<dyn DocumentRegistry>,
        world: Arc<dyn WorldContext>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            coordinator,
            registry,
            world,
            notifier,
        }
    }

    pub async fn perform(&self) -> Result<RecoveryReport> {
        if !self.world.is_privileged() {
            return Err(PhantomError::Unauthorized(
                "only the session owner can run recovery".to_string(),
            ));
        }

        let phantoms: Vec<_> = DocumentKind::ALL
            .iter()
            .flat_map(|kind| self.registry.documents(*kind))
            .filter(|doc| self.coordinator.is_phantom(doc) || doc.is_hydrating())
            .collect();

        let mut report = RecoveryReport::default();
        if phantoms.is_empty() {
            self.notifier.info("No phantoms to restore.");
            return Ok(report);
        }

        self.notifier
            .info(&format!("Restoring {} phantoms...", phantoms.len()));
        let span = info_span!("recovery.exorcise", phantoms = phantoms.len());
        async {
            for doc in phantoms {
                match self.coordinator.ensure_hydrated(&doc).await {
                    Ok(_) => report.restored.push(doc.key().clone()),
                    Err(err) => {
                        event!(Level::ERROR, document = %doc.key(), error = %err, "recovery failed");
                        self.notifier
                            .error(&format!("Could not restore {}: {}", doc.key(), err));
                        report.failed.push((doc.key().clone(), err));
                    }
                }
            }
        }
        .instrument(span)
        .await;

        event!(
            Level::INFO,
            restored = report.restored.len(),
            failed = report.failed.len(),
            "recovery finished"
        );
        self.notifier.info(&format!(
            "Recovery complete. Restored {}, failed {}.",
            report.restored.len(),
            report.failed.len()
        ));
        Ok(report)
    }
}
