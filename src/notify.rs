use log::{error, info};
use metrics::counter;
use tokio::sync::mpsc;

/// Job descriptor handed to the delivery worker. The core only ever produces
/// these; it never awaits delivery and a failed send must not surface.
#[derive(Debug, Clone)]
pub enum NotifyJob {
    Email {
        subject: String,
        body: String,
        to: Vec<String>,
    },
    EmailWithAttachment {
        subject: String,
        body: String,
        to: Vec<String>,
        filename: String,
        bytes: Vec<u8>,
    },
    Sms {
        phone: String,
        text: String,
    },
}

/// Fire-and-forget producer side of the notification queue.
pub trait Notifier: Send + Sync {
    /// Returns false when the job was rejected up front (empty recipients,
    /// queue gone). Callers treat that as "nothing was sent".
    fn enqueue(&self, job: NotifyJob) -> bool;
}

/// Notifier backed by an unbounded tokio channel with a spawned drain task.
/// Delivery itself (SMTP / SMS gateway) is a deployment concern; the worker
/// logs each job so operators can verify the pipeline end to end.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<NotifyJob>,
}

impl ChannelNotifier {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NotifyJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    NotifyJob::Email { subject, to, .. } => {
                        info!("delivering email '{subject}' to {to:?}");
                    }
                    NotifyJob::EmailWithAttachment { subject, to, filename, bytes, .. } => {
                        info!(
                            "delivering email '{subject}' to {to:?} with attachment {filename} ({} bytes)",
                            bytes.len()
                        );
                    }
                    NotifyJob::Sms { phone, .. } => {
                        info!("delivering sms to {phone}");
                    }
                }
            }
        });
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn enqueue(&self, job: NotifyJob) -> bool {
        counter!("notify_jobs_enqueued", 1);
        if let Err(e) = self.tx.send(job) {
            // Worker gone; log and degrade, the business operation still succeeds.
            error!("notification queue closed, dropping job: {e}");
            return false;
        }
        true
    }
}

/// Queue an email unless the recipient list is empty.
pub fn send_email_safely(notifier: &dyn Notifier, subject: &str, body: &str, to: &[String]) -> bool {
    if to.is_empty() {
        return false;
    }
    notifier.enqueue(NotifyJob::Email {
        subject: subject.to_string(),
        body: body.to_string(),
        to: to.to_vec(),
    })
}

pub fn send_email_with_attachment_safely(
    notifier: &dyn Notifier,
    subject: &str,
    body: &str,
    to: &[String],
    filename: &str,
    bytes: Vec<u8>,
) -> bool {
    if to.is_empty() || bytes.is_empty() {
        return false;
    }
    notifier.enqueue(NotifyJob::EmailWithAttachment {
        subject: subject.to_string(),
        body: body.to_string(),
        to: to.to_vec(),
        filename: filename.to_string(),
        bytes,
    })
}

/// Queue an SMS; blank phone or text is a no-op.
pub fn send_sms_safely(notifier: &dyn Notifier, phone: &str, text: &str) -> bool {
    let phone = phone.trim();
    let text = text.trim();
    if phone.is_empty() || text.is_empty() {
        return false;
    }
    notifier.enqueue(NotifyJob::Sms { phone: phone.to_string(), text: text.to_string() })
}
