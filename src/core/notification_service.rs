// core/notification_service.rs
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{ExpirationThreshold, ExpiringRun};
use crate::infrastructure::mailer::{EmailMessage, Mailer};
use crate::utils::error::Result;

pub const EXPIRATION_SUBJECT: &str = "Your EventKit DataPack is set to expire.";

/// Échappement minimal pour insérer du texte dans le HTML
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Avertissements d'expiration envoyés aux propriétaires des runs
pub struct ExpirationNotifier {
    mailer: Arc<dyn Mailer>,
    site_url: String,
    from_email: String,
}

impl ExpirationNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, site_url: &str, from_email: &str) -> Self {
        Self {
            mailer,
            site_url: site_url.trim_end_matches('/').to_string(),
            from_email: from_email.to_string(),
        }
    }

    /// Page de statut du job
    pub fn status_url(&self, job_uid: Uuid) -> String {
        format!("{}/status/{}", self.site_url, job_uid)
    }

    pub fn build_warning(&self, expiring: &ExpiringRun, to: &str, threshold: ExpirationThreshold) -> EmailMessage {
        let url = self.status_url(expiring.run.job_uid);
        let date = expiring.run.expiration.format("%Y-%m-%d %H:%M:%S%:z").to_string();

        let text_body = format!(
            r#"Hello,

Your EventKit DataPack "{job}" will expire on {date} ({threshold} notice).
After this date the files will be deleted and the DataPack will no longer be available.

To view or re-run the DataPack, go to:
{url}

The EventKit Team"#,
            job = expiring.job_name,
            date = date,
            threshold = threshold,
            url = url,
        );

        let html_body = format!(
            r#"<html>
<body>
<p>Hello,</p>
<p>Your EventKit DataPack <strong>{job}</strong> will expire on {date}.
After this date the files will be deleted and the DataPack will no longer be available.</p>
<p>To view or re-run the DataPack, go to <a href="{url}">{url}</a>.</p>
<p>The EventKit Team</p>
</body>
</html>"#,
            job = escape_html(&expiring.job_name),
            date = date,
            url = url,
        );

        EmailMessage {
            subject: EXPIRATION_SUBJECT.to_string(),
            text_body,
            html_body,
            from: self.from_email.clone(),
            to: vec![to.to_string()],
        }
    }

    /// Envoyer l'avertissement d'expiration d'un run
    pub async fn send_expiration_warning(
        &self,
        expiring: &ExpiringRun,
        to: &str,
        threshold: ExpirationThreshold,
    ) -> Result<()> {
        let message = self.build_warning(expiring, to, threshold);
        self.mailer.send(&message).await
    }
}
