use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;
use whatsnep::client::{Conversations, LogNotifier, MessageChannel, PresenceTracker, SessionState, SessionStore};
use whatsnep::validate::SignUpForm;
use whatsnep::{Error, Platform};

fn form(username: &str) -> SignUpForm {
    SignUpForm {
        username: username.into(),
        email: format!("{username}@example.com"),
        password: "rahasia123".into(),
        confirm_password: "rahasia123".into(),
    }
}

async fn signed_up(platform: &Platform, username: &str) -> (SessionStore, Uuid) {
    let mut store = SessionStore::new(platform.clone());
    assert_eq!(store.init(None).await, SessionState::Anonymous);
    let id = store.sign_up(&form(username)).await.unwrap().id;
    (store, id)
}

#[tokio::test]
async fn two_users_chat() {
    let platform = Platform::connect("sqlite::memory:", 64).await.unwrap();
    let (alice, alice_id) = signed_up(&platform, "alice").await;
    let (mut bob, bob_id) = signed_up(&platform, "bob").await;

    let presence = PresenceTracker::start(&platform).await.unwrap();
    assert!(presence.is_online(alice_id));
    assert!(presence.is_online(bob_id));

    let alice_list = Conversations::new(platform.tables.clone(), alice_id);
    let conversation_id = alice_list.open_with(bob_id).await.unwrap();
    assert_eq!(alice_list.list().len(), 1);
    let bob_list = Conversations::new(platform.tables.clone(), bob_id);
    assert_eq!(bob_list.open_with(alice_id).await, Some(conversation_id));

    let (tx, mut notifications) = mpsc::unbounded_channel();
    let mut bob_channel = MessageChannel::new(platform.clone(), bob_id, Arc::new(tx));
    bob_channel.activate(conversation_id).await.unwrap();
    let mut bob_messages = bob_channel.watch();

    let alice_channel = MessageChannel::new(platform.clone(), alice_id, Arc::new(LogNotifier));
    alice_channel.send(conversation_id, "Halo Bob!").await.unwrap();

    let received = timeout(Duration::from_secs(2), bob_messages.wait_for(|list| !list.is_empty()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(received[0].message.content, "Halo Bob!");
    assert_eq!(received[0].sender.as_ref().map(|s| s.username.as_str()), Some("alice"));

    let notification = timeout(Duration::from_secs(2), notifications.recv()).await.unwrap().unwrap();
    assert_eq!(notification.body, "alice: Halo Bob!");

    let mut unread = usize::MAX;
    for _ in 0..50 {
        let list = bob_list.refresh().await.unwrap();
        assert_eq!(list[0].last_message.as_ref().map(|m| m.content.as_str()), Some("Halo Bob!"));
        unread = list[0].unread_count;
        if unread == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(unread, 0);

    let mut online = presence.watch();
    alice.unload().await;
    timeout(Duration::from_secs(2), online.wait_for(|set| !set.contains(&alice_id)))
        .await
        .unwrap()
        .unwrap();
    assert!(presence.is_online(bob_id));

    let token = bob.token().unwrap().to_owned();
    bob.sign_out().await.unwrap();
    assert_eq!(bob.state(), SessionState::Anonymous);
    let mut revisit = SessionStore::new(platform.clone());
    assert_eq!(revisit.init(Some(token)).await, SessionState::Anonymous);
}

#[tokio::test]
async fn usernames_are_unique() {
    let platform = Platform::connect("sqlite::memory:", 64).await.unwrap();
    let (store, _) = signed_up(&platform, "nep").await;
    assert!(!store.check_username_availability("nep").await);
    assert!(store.check_username_availability("nep2").await);

    let mut other = SessionStore::new(platform.clone());
    let mut taken = form("nep");
    taken.email = "lain@example.com".into();
    assert!(matches!(other.sign_up(&taken).await, Err(Error::UsernameTaken)));
}
