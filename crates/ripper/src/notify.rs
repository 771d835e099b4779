use std::time::Duration;

use log::{debug, error};

use crate::config::RipConfig;
use crate::job::Job;

pub const NOTIFY_TITLE: &str = "Autorip notification";

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire-and-forget notification sink
///
/// Delivery failure must never abort a job, so every error here is logged
/// and swallowed. With no URLs configured this is a no-op.
pub struct Notifier {
    urls: Vec<String>,
    site_name: String,
    include_job_id: bool,
    client: reqwest::Client,
}

impl Notifier {
    pub fn from_config(cfg: &RipConfig) -> Self {
        Self {
            urls: cfg.notify_urls.clone(),
            site_name: cfg.site_name.clone(),
            include_job_id: cfg.notify_job_id,
            client: reqwest::Client::new(),
        }
    }

    pub async fn notify(&self, job: &Job, title: &str, body: &str) {
        if self.urls.is_empty() {
            return;
        }

        let title = format_title(&self.site_name, self.include_job_id, job, title);
        let payload = serde_json::json!({ "title": title, "body": body });

        for url in &self.urls {
            let sent = self
                .client
                .post(url)
                .timeout(NOTIFY_TIMEOUT)
                .json(&payload)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            match sent {
                Ok(_) => debug!("notification delivered to {url}"),
                Err(e) => {
                    error!("failed sending notification to {url}: {e}. Continuing processing...")
                }
            }
        }
    }
}

/// Prepend the site name and append the job id when configured
fn format_title(site_name: &str, include_job_id: bool, job: &Job, title: &str) -> String {
    let mut full = title.to_string();
    if !site_name.is_empty() {
        full = format!("[{site_name}] - {full}");
    }
    if include_job_id {
        full = format!("{full} - {}", job.job_id);
    }
    full
}
