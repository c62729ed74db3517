use shared::request::RequestCore;
use tracing::{debug, warn};

use crate::collaborators::{CoordinatorAllocator, Envelope, MailStatus, Mailer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Submitted,
    Approved,
}

impl Notice {
    fn subject(self, core: &RequestCore) -> String {
        match self {
            Notice::Submitted => format!("Request {} submitted for approval", core.id),
            Notice::Approved => format!("Request {} fully approved", core.id),
        }
    }

    fn body(self, core: &RequestCore, name: &str) -> String {
        match self {
            Notice::Submitted => format!(
                "Dear {name},\n\nrequest {} on call {} was submitted and awaits your approval.\n",
                core.id, core.call_id
            ),
            Notice::Approved => format!(
                "Dear {name},\n\nrequest {} on call {} has been approved by every institution.\n",
                core.id, core.call_id
            ),
        }
    }
}

/// Mails every coordinator of the request's active institutions. Never
/// fails: missing contacts and delivery problems are only logged.
pub async fn notify_coordinators(
    allocator: &dyn CoordinatorAllocator,
    mailer: &dyn Mailer,
    core: &RequestCore,
    notice: Notice,
) -> usize {
    let mut sent = 0;
    for coordinator_id in core.coordinators() {
        let coordinator = match allocator.find(coordinator_id).await {
            Ok(Some(coordinator)) => coordinator,
            Ok(None) => {
                warn!(request_id = %core.id, %coordinator_id, "coordinator has no contact details");
                continue;
            }
            Err(err) => {
                warn!(request_id = %core.id, %coordinator_id, error = %err, "coordinator lookup failed");
                continue;
            }
        };

        let envelope = Envelope {
            to: coordinator.email,
            subject: notice.subject(core),
            body: notice.body(core, &coordinator.name),
        };
        match mailer.send(envelope).await {
            MailStatus::Sent => {
                debug!(request_id = %core.id, %coordinator_id, ?notice, "coordinator notified");
                sent += 1;
            }
            MailStatus::Failed(reason) => {
                warn!(request_id = %core.id, %coordinator_id, %reason, "notification failed");
            }
        }
    }
    sent
}
