use crate::error::StoreError;
use crate::events::{is_join, ChatRef, MemberState};
use crate::store::{Profile, StatusStore, UserRecord};
use crate::transport::{ChatTransport, InlineKeyboard};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted { record: UserRecord, onboarded: bool },
    Ignored,
}

/// Creates records for members joining the group. Joins are reported both as member
/// transitions and as service messages, often for the same join, so admitting twice
/// must leave a single record. The onboarding message may go out twice.
pub struct MembershipTracker {
    store: Arc<StatusStore>,
    transport: Arc<dyn ChatTransport>,
    greeting: String,
    keyboard: InlineKeyboard,
}

impl MembershipTracker {
    pub fn new(
        store: Arc<StatusStore>,
        transport: Arc<dyn ChatTransport>,
        greeting: String,
        keyboard: InlineKeyboard,
    ) -> Self {
        Self {
            store,
            transport,
            greeting,
            keyboard,
        }
    }

    pub async fn admit(&self, profile: &Profile) -> Result<Admission, StoreError> {
        if profile.is_bot {
            log::debug!("Not admitting bot account {}", profile.chat_id);
            return Ok(Admission::Ignored);
        }

        let record = self.store.upsert(profile).await?;

        let onboarded = match self
            .transport
            .send_message(&profile.chat_id, &self.greeting, Some(&self.keyboard))
            .await
        {
            Ok(()) => true,
            Err(e) if e.is_unreachable_user() => {
                log::debug!("Cannot reach {} privately: {e}", profile.chat_id);
                false
            }
            Err(e) => {
                log::warn!("Failed to onboard {}: {e}", profile.chat_id);
                false
            }
        };

        log::info!(
            "Admitted {} with status {}",
            record.chat_id,
            self.store.taxonomy().display(&record.status)
        );
        Ok(Admission::Admitted { record, onboarded })
    }

    pub async fn on_transition(
        &self,
        chat: &ChatRef,
        subject: &Profile,
        old: MemberState,
        new: MemberState,
    ) -> Result<Admission, StoreError> {
        if !chat.kind.is_group() || !is_join(old, new) {
            log::debug!(
                "Ignoring transition {old:?} -> {new:?} for {} in {}",
                subject.chat_id,
                chat.id
            );
            return Ok(Admission::Ignored);
        }
        self.admit(subject).await
    }

    /// Admits each listed member in turn. The first store error stops the batch.
    pub async fn on_new_members(
        &self,
        chat: &ChatRef,
        members: &[Profile],
    ) -> Result<Vec<Admission>, StoreError> {
        if !chat.kind.is_group() {
            return Ok(Vec::new());
        }
        let mut admissions = Vec::with_capacity(members.len());
        for member in members {
            admissions.push(self.admit(member).await?);
        }
        Ok(admissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChatKind;
    use crate::status::{Status, StatusTaxonomy, Tier};
    use crate::store::{Column, MemorySheet};
    use crate::transport::RecordingTransport;

    fn tracker() -> (Arc<MemorySheet>, Arc<RecordingTransport>, MembershipTracker) {
        let sheet = Arc::new(MemorySheet::new());
        let transport = Arc::new(RecordingTransport::new());
        let store = Arc::new(StatusStore::new(sheet.clone(), StatusTaxonomy::default()));
        let tracker = MembershipTracker::new(
            store,
            transport.clone(),
            "welcome".to_string(),
            InlineKeyboard::single("Получить доступ", "get_access"),
        );
        (sheet, transport, tracker)
    }

    fn group() -> ChatRef {
        ChatRef::new(-1001, ChatKind::Supergroup)
    }

    #[tokio::test]
    async fn test_join_creates_observer_and_onboards() {
        let (sheet, transport, tracker) = tracker();

        let admission = tracker
            .on_transition(&group(), &Profile::new(21), MemberState::Left, MemberState::Member)
            .await
            .unwrap();

        match admission {
            Admission::Admitted { record, onboarded } => {
                assert_eq!(record.status, Status::OBSERVER);
                assert!(onboarded);
            }
            other => panic!("Expected admission, got {other:?}"),
        }
        assert_eq!(sheet.count_records("21"), 1);
        assert_eq!(transport.messages_to("21"), vec!["welcome".to_string()]);
    }

    #[tokio::test]
    async fn test_both_join_shapes_leave_one_record() {
        let (sheet, transport, tracker) = tracker();
        let member = Profile::new(22);

        tracker
            .on_transition(&group(), &member, MemberState::Kicked, MemberState::Member)
            .await
            .unwrap();
        tracker
            .on_new_members(&group(), std::slice::from_ref(&member))
            .await
            .unwrap();

        assert_eq!(sheet.count_records("22"), 1);
        assert_eq!(transport.messages_to("22").len(), 2);
    }

    #[tokio::test]
    async fn test_rejoin_keeps_elevated_status() {
        let (sheet, _transport, tracker) = tracker();
        sheet.push_row(&["23", "", "", "Резидент", "2024-05-01 12:00", "2024-05-01 12:00"]);

        let admission = tracker.admit(&Profile::new(23)).await.unwrap();
        assert!(matches!(
            admission,
            Admission::Admitted { ref record, .. } if record.status == Status::Known(Tier::Resident)
        ));
        assert_eq!(sheet.cell(2, Column::Status), "Резидент");
    }

    #[tokio::test]
    async fn test_leaving_is_not_a_join() {
        let (sheet, transport, tracker) = tracker();

        let admission = tracker
            .on_transition(&group(), &Profile::new(24), MemberState::Member, MemberState::Left)
            .await
            .unwrap();

        assert_eq!(admission, Admission::Ignored);
        assert_eq!(sheet.record_rows(), 0);
        assert!(transport.actions().is_empty());
    }

    #[tokio::test]
    async fn test_bots_are_not_admitted() {
        let (sheet, _transport, tracker) = tracker();
        let mut bot = Profile::new(25);
        bot.is_bot = true;

        let admissions = tracker.on_new_members(&group(), &[bot]).await.unwrap();
        assert_eq!(admissions, vec![Admission::Ignored]);
        assert_eq!(sheet.record_rows(), 0);
    }

    #[tokio::test]
    async fn test_blocked_member_is_still_recorded() {
        let (sheet, transport, tracker) = tracker();
        transport.block_chat("26");

        let admission = tracker.admit(&Profile::new(26)).await.unwrap();
        assert!(matches!(admission, Admission::Admitted { onboarded: false, .. }));
        assert_eq!(sheet.count_records("26"), 1);
    }
}
