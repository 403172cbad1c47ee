//! Fire-and-forget email notifications. Handlers push jobs onto an
//! in-process queue and move on; a worker task drains the queue and talks
//! to the `Mailer`. Nothing on this path can fail a request.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A composed outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Queued when a snippet is created. Carries plain values, not ids, so the
/// worker never reads the database.
#[derive(Debug, Clone)]
pub struct SnippetCreated {
    pub name: String,
    pub description: String,
    pub recipient: Option<String>,
}

impl SnippetCreated {
    /// Compose the confirmation mail. Authors without an email address get
    /// nothing, so this returns `None` and the job evaporates.
    pub fn into_email(self, from: &str) -> Option<EmailMessage> {
        let to = self.recipient.filter(|r| !r.trim().is_empty())?;
        Some(EmailMessage {
            from: from.to_string(),
            to,
            subject: format!("Snippet \"{}\" created successfully", self.name),
            body: format!(
                "The snippet \"{}\" was created with the following description: \n{}",
                self.name, self.description
            ),
        })
    }
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Default transport: writes deliveries to the log. Swapping in a real SMTP
/// client only touches this type.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email delivered"
        );
        Ok(())
    }
}

/// Test double that records every delivery.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("recorder lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

/// Sender half of the notification queue, cloned into `AppState`.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: UnboundedSender<SnippetCreated>,
}

impl NotificationQueue {
    pub fn channel() -> (Self, UnboundedReceiver<SnippetCreated>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Non-blocking enqueue. A closed queue is logged and swallowed; the
    /// request that triggered the job has already succeeded.
    pub fn enqueue(&self, job: SnippetCreated) {
        if self.tx.send(job).is_err() {
            warn!("notification queue closed; job dropped");
        }
    }
}

/// Drain the queue until every sender is gone. Delivery failures are logged
/// and the worker keeps going.
pub fn spawn_worker(
    mut jobs: UnboundedReceiver<SnippetCreated>,
    mailer: Arc<dyn Mailer>,
    from: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let snippet = job.name.clone();
            match job.into_email(&from) {
                Some(message) => {
                    if let Err(e) = mailer.send(&message).await {
                        error!(error = %e, to = %message.to, "email delivery failed");
                    }
                }
                None => info!(snippet = %snippet, "author has no email; notification skipped"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_skips_missing_or_blank_recipient() {
        let no_recipient = SnippetCreated {
            name: "hello".into(),
            description: "world".into(),
            recipient: None,
        };
        assert!(no_recipient.into_email("from@example.com").is_none());

        let blank_recipient = SnippetCreated {
            name: "hello".into(),
            description: "world".into(),
            recipient: Some("   ".into()),
        };
        assert!(blank_recipient.into_email("from@example.com").is_none());
    }

    #[test]
    fn compose_builds_the_confirmation_mail() {
        let job = SnippetCreated {
            name: "quicksort".into(),
            description: "sorts things quickly".into(),
            recipient: Some("ada@example.com".into()),
        };
        let mail = job.into_email("noreply@snipbin.test").expect("composed");
        assert_eq!(mail.to, "ada@example.com");
        assert_eq!(mail.from, "noreply@snipbin.test");
        assert_eq!(mail.subject, "Snippet \"quicksort\" created successfully");
        assert!(mail.body.contains("quicksort"));
        assert!(mail.body.contains("sorts things quickly"));
    }

    #[tokio::test]
    async fn worker_delivers_queued_jobs_and_stops_when_queue_closes() {
        let (queue, jobs) = NotificationQueue::channel();
        let mailer = Arc::new(RecordingMailer::default());
        let handle = spawn_worker(jobs, mailer.clone(), "noreply@snipbin.test".into());

        queue.enqueue(SnippetCreated {
            name: "first".into(),
            description: "".into(),
            recipient: Some("ada@example.com".into()),
        });
        queue.enqueue(SnippetCreated {
            name: "no-mail".into(),
            description: "".into(),
            recipient: None,
        });
        queue.enqueue(SnippetCreated {
            name: "second".into(),
            description: "".into(),
            recipient: Some("grace@example.com".into()),
        });

        drop(queue);
        handle.await.expect("worker exits cleanly");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "ada@example.com");
        assert_eq!(sent[1].to, "grace@example.com");
    }

    #[tokio::test]
    async fn enqueue_after_worker_gone_does_not_panic() {
        let (queue, jobs) = NotificationQueue::channel();
        drop(jobs);
        queue.enqueue(SnippetCreated {
            name: "orphan".into(),
            description: "".into(),
            recipient: Some("ada@example.com".into()),
        });
    }
}
