//! Offline walk-through of the moderation flow against an in-memory worksheet.

use crate::config::Config;
use crate::events::{ChatKind, ChatRef, Event, GroupMessage, MemberState};
use crate::router::{EventRouter, Outcome};
use crate::status::Tier;
use crate::store::{Column, MemorySheet, Profile, StatusStore};
use crate::transport::{RecordingTransport, SentAction};
use std::sync::Arc;

const GROUP: i64 = -1001234567890;
const MEMBER: i64 = 555;

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let sheet = Arc::new(MemorySheet::new());
    let transport = Arc::new(RecordingTransport::new());
    let store = Arc::new(StatusStore::new(sheet.clone(), config.taxonomy.clone()));
    let router = EventRouter::from_config(store.clone(), transport.clone(), config);

    let mut member = Profile::new(MEMBER);
    member.username = "anna".to_string();
    member.first_name = "Anna".to_string();
    let group = ChatRef::new(GROUP, ChatKind::Supergroup);

    println!("🧪 member-gate demo (in-memory worksheet, no network)");
    println!();

    step(
        "1. Member sends /start in a private chat",
        &router,
        &transport,
        Event::Command {
            from: member.clone(),
            chat: ChatRef::new(MEMBER, ChatKind::Private),
            name: "start".to_string(),
        },
    )
    .await?;

    step(
        "2. Member joins the group (reported twice)",
        &router,
        &transport,
        Event::MemberTransition {
            chat: group.clone(),
            subject: member.clone(),
            old: MemberState::Left,
            new: MemberState::Member,
        },
    )
    .await?;
    step(
        "   ...and as a service message",
        &router,
        &transport,
        Event::NewMembers {
            chat: group.clone(),
            members: vec![member.clone()],
        },
    )
    .await?;

    let post = |message_id| {
        Event::GroupMessage(GroupMessage {
            from: member.clone(),
            chat: group.clone(),
            message_id,
            text: Some("Всем привет!".to_string()),
        })
    };

    step("3. Member posts in the group", &router, &transport, post(1)).await?;

    let partner = config.taxonomy.label(Tier::Partner).to_string();
    if let Some(row) = store.lookup(&member.chat_id).await? {
        sheet.set_cell(row.row(), Column::Status, &partner);
        println!("4. Administrator sets row {} status to «{partner}»", row.row());
        println!();
    }

    step("5. Member posts again", &router, &transport, post(2)).await?;

    println!(
        "📋 Records for {MEMBER}: {} (rows in worksheet: {})",
        sheet.count_records(&member.chat_id),
        sheet.record_rows()
    );
    Ok(())
}

async fn step(
    title: &str,
    router: &EventRouter,
    transport: &RecordingTransport,
    event: Event,
) -> anyhow::Result<()> {
    transport.clear();
    println!("{title}");
    let outcome = router.route(event).await?;
    println!("   Outcome: {}", describe(&outcome));
    for action in transport.actions() {
        match action {
            SentAction::Message { chat_id, text, .. } => {
                println!("   → message to {chat_id}: {}", first_line(&text))
            }
            SentAction::Delete {
                chat_id,
                message_id,
            } => println!("   → deleted message {message_id} in {chat_id}"),
            SentAction::CallbackAnswer { callback_id } => {
                println!("   → answered callback {callback_id}")
            }
        }
    }
    println!();
    Ok(())
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Moderated(evaluation) => format!("{evaluation:?}"),
        Outcome::Admitted(admissions) => format!("{} admission(s)", admissions.len()),
        Outcome::Command(command) => format!("{command:?}"),
        Outcome::Ignored => "ignored".to_string(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
