// core/run_lifecycle.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::notification_service::ExpirationNotifier;
use crate::domain::{ExpirationThreshold, ExportRun};
use crate::infrastructure::database::RunStore;
use crate::utils::error::Result;

/// Décision prise pour un run lors d'un passage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    Delete,
    Notify(ExpirationThreshold),
    Nothing,
}

/// Décide du sort d'un run à l'instant `now`
///
/// - expiré: suppression
/// - moins de 2 jours: avertissement sauf si déjà envoyé dans cette fenêtre
/// - moins de 7 jours: avertissement si aucun n'a encore été envoyé
pub fn next_action(run: &ExportRun, now: DateTime<Utc>) -> RunAction {
    if run.expiration <= now {
        return RunAction::Delete;
    }

    let remaining = run.expiration - now;
    if remaining <= ExpirationThreshold::TwoDay.window() {
        let window_start = run.expiration - ExpirationThreshold::TwoDay.window();
        match run.notified {
            Some(notified) if notified >= window_start => RunAction::Nothing,
            _ => RunAction::Notify(ExpirationThreshold::TwoDay),
        }
    } else if remaining <= ExpirationThreshold::SevenDay.window() && run.notified.is_none() {
        RunAction::Notify(ExpirationThreshold::SevenDay)
    } else {
        RunAction::Nothing
    }
}

/// Résultat d'un passage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub deleted: Vec<Uuid>,
    pub notified: Vec<(Uuid, ExpirationThreshold)>,
    /// Runs à prévenir dont le propriétaire n'a pas d'email
    pub skipped: usize,
    pub failures: usize,
}

/// Suppression des runs expirés et avertissements gradués
pub struct RunLifecycleScheduler {
    store: Arc<dyn RunStore>,
    notifier: Arc<ExpirationNotifier>,
}

impl RunLifecycleScheduler {
    pub fn new(store: Arc<dyn RunStore>, notifier: Arc<ExpirationNotifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Un passage sur tous les runs; chaque run est traité indépendamment
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let runs = self.store.list_runs().await?;
        let mut report = SweepReport::default();

        for expiring in &runs {
            let run = &expiring.run;
            match next_action(run, now) {
                RunAction::Nothing => {}
                RunAction::Delete => match self.store.delete_run(run.uid).await {
                    Ok(()) => {
                        debug!("🗑️  Run {} expiré supprimé", run.uid);
                        report.deleted.push(run.uid);
                    }
                    Err(e) => {
                        error!("❌ Suppression du run {} impossible: {}", run.uid, e);
                        report.failures += 1;
                    }
                },
                RunAction::Notify(threshold) => {
                    let Some(email) = expiring.email.as_deref() else {
                        warn!("⚠️  Run {}: propriétaire sans email, avertissement ignoré", run.uid);
                        report.skipped += 1;
                        continue;
                    };

                    if let Err(e) = self.notifier.send_expiration_warning(expiring, email, threshold).await {
                        error!("❌ Envoi de l'avertissement {} pour le run {} impossible: {}", threshold, run.uid, e);
                        report.failures += 1;
                        continue;
                    }

                    match self.store.mark_notified(run.uid, now).await {
                        Ok(()) => report.notified.push((run.uid, threshold)),
                        Err(e) => {
                            error!("❌ Run {}: notification non enregistrée: {}", run.uid, e);
                            report.failures += 1;
                        }
                    }
                }
            }
        }

        info!(
            "🧹 Expiration des runs: {} examinés, {} supprimés, {} avertis, {} ignorés, {} échecs",
            runs.len(),
            report.deleted.len(),
            report.notified.len(),
            report.skipped,
            report.failures
        );
        Ok(report)
    }
}
