//! Event router
//!
//! Every inbound event runs as its own task. A semaphore bounds how many are in flight
//! and a per-identity lock makes events about one member run one at a time, in arrival
//! order of lock acquisition. Events about different members proceed in parallel.

use crate::commands::{CommandHandler, CommandOutcome};
use crate::config::Config;
use crate::error::StoreError;
use crate::events::{ChatKind, Event};
use crate::locks::IdentityLocks;
use crate::membership::{Admission, MembershipTracker};
use crate::moderation::{Evaluation, ModerationEngine};
use crate::policy::AccessPolicy;
use crate::store::StatusStore;
use crate::transport::ChatTransport;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Moderated(Evaluation),
    Admitted(Vec<Admission>),
    Command(CommandOutcome),
    Ignored,
}

pub struct EventRouter {
    moderation: ModerationEngine,
    membership: MembershipTracker,
    commands: CommandHandler,
    locks: IdentityLocks,
    permits: Arc<Semaphore>,
}

impl EventRouter {
    pub fn new(
        moderation: ModerationEngine,
        membership: MembershipTracker,
        commands: CommandHandler,
        max_concurrent_events: usize,
    ) -> Self {
        Self {
            moderation,
            membership,
            commands,
            locks: IdentityLocks::new(),
            permits: Arc::new(Semaphore::new(max_concurrent_events.max(1))),
        }
    }

    /// Wires the handlers over one shared store and transport.
    pub fn from_config(
        store: Arc<StatusStore>,
        transport: Arc<dyn ChatTransport>,
        config: &Config,
    ) -> Self {
        let commands = CommandHandler::new(store.clone(), transport.clone(), config.messages.clone());
        let membership = MembershipTracker::new(
            store.clone(),
            transport.clone(),
            config.messages.new_member.clone(),
            commands.keyboard().clone(),
        );
        let moderation = ModerationEngine::new(
            store,
            transport,
            AccessPolicy::from_taxonomy(&config.taxonomy),
            config.messages.denied_notice.clone(),
        );
        Self::new(
            moderation,
            membership,
            commands,
            config.router.max_concurrent_events,
        )
    }

    /// Spawns one task per identity-scoped unit of work. Handler failures are logged
    /// inside the task and never reach the caller.
    pub fn dispatch(self: &Arc<Self>, event: Event) -> Vec<JoinHandle<()>> {
        event
            .split()
            .into_iter()
            .map(|event| {
                let router = Arc::clone(self);
                tokio::spawn(async move {
                    let _permit = match router.permits.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            log::warn!("Router is shut down, dropping {} event", event.kind());
                            return;
                        }
                    };
                    let _guard = match event.identity() {
                        Some(identity) => Some(router.locks.lock(identity).await),
                        None => None,
                    };

                    let kind = event.kind();
                    match router.route(event).await {
                        Ok(outcome) => log::debug!("Handled {kind} event: {outcome:?}"),
                        Err(e) => log::error!("Failed to handle {kind} event: {e}"),
                    }
                })
            })
            .collect()
    }

    /// Runs the handler for one event in the calling task.
    pub async fn route(&self, event: Event) -> Result<Outcome, StoreError> {
        match event {
            Event::GroupMessage(message) => {
                Ok(Outcome::Moderated(self.moderation.evaluate(&message).await?))
            }
            Event::Command { from, chat, name } => {
                if chat.kind != ChatKind::Private {
                    return Ok(Outcome::Ignored);
                }
                Ok(Outcome::Command(
                    self.commands.handle_command(&from, &chat, &name).await?,
                ))
            }
            Event::Callback {
                id,
                from,
                chat,
                data,
            } => Ok(Outcome::Command(
                self.commands
                    .handle_callback(&id, &from, chat.as_ref(), data.as_deref())
                    .await?,
            )),
            Event::MemberTransition {
                chat,
                subject,
                old,
                new,
            } => match self.membership.on_transition(&chat, &subject, old, new).await? {
                Admission::Ignored => Ok(Outcome::Ignored),
                admission => Ok(Outcome::Admitted(vec![admission])),
            },
            Event::NewMembers { chat, members } => Ok(Outcome::Admitted(
                self.membership.on_new_members(&chat, &members).await?,
            )),
        }
    }
}
