use crate::error::StoreError;
use crate::events::GroupMessage;
use crate::policy::AccessPolicy;
use crate::status::Status;
use crate::store::StatusStore;
use crate::transport::ChatTransport;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAGroup,
    BotAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Skipped(SkipReason),
    Allowed(Status),
    Denied {
        status: Status,
        /// The message is gone, whether removed now or already deleted.
        deleted: bool,
        notified: bool,
    },
}

/// Deletes group messages posted by members whose status does not permit posting.
pub struct ModerationEngine {
    store: Arc<StatusStore>,
    transport: Arc<dyn ChatTransport>,
    policy: AccessPolicy,
    denied_notice: String,
}

impl ModerationEngine {
    pub fn new(
        store: Arc<StatusStore>,
        transport: Arc<dyn ChatTransport>,
        policy: AccessPolicy,
        denied_notice: String,
    ) -> Self {
        Self {
            store,
            transport,
            policy,
            denied_notice,
        }
    }

    /// A store error returns before any transport action, so the message stays up.
    pub async fn evaluate(&self, message: &GroupMessage) -> Result<Evaluation, StoreError> {
        if !message.chat.kind.is_group() {
            return Ok(Evaluation::Skipped(SkipReason::NotAGroup));
        }
        if message.from.is_bot {
            log::debug!(
                "Skipping message {} from bot account {}",
                message.message_id,
                message.from.chat_id
            );
            return Ok(Evaluation::Skipped(SkipReason::BotAuthor));
        }

        let author = &message.from.chat_id;
        self.store.upsert(&message.from).await?;
        let status = self.store.get_status(author).await?;

        if self.policy.is_allowed(&status) {
            log::debug!("Message {} from {author} allowed ({status})", message.message_id);
            return Ok(Evaluation::Allowed(status));
        }

        let deleted = match self
            .transport
            .delete_message(&message.chat.id, message.message_id)
            .await
        {
            Ok(()) => true,
            Err(e) if e.is_message_gone() => {
                log::debug!("Message {} was already deleted", message.message_id);
                true
            }
            Err(e) => {
                log::warn!(
                    "Failed to delete message {} in {}: {e}",
                    message.message_id,
                    message.chat.id
                );
                false
            }
        };

        let notified = match self
            .transport
            .send_message(author, &self.denied_notice, None)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Could not notify {author} directly: {e}");
                false
            }
        };

        log::info!(
            "Denied message {} from {author} in {} (status: {status}, deleted: {deleted})",
            message.message_id,
            message.chat.id
        );

        Ok(Evaluation::Denied {
            status,
            deleted,
            notified,
        })
    }
}
