//! End-to-end room session behavior over the in-memory store

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use roomchat_api::websocket::{Connection, RoomSessions, ServerEvent};
use roomchat_shared::{ChatStore, MemoryChatStore, NewRoom, RoomId, User};
use tokio::sync::mpsc;

struct Client {
    conn: Arc<Connection>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    user: User,
}

impl Client {
    async fn connect(sessions: &RoomSessions, user: User) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = sessions.connect(tx).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::Connected {
                connection_id: conn.id
            }
        );
        Self { conn, rx, user }
    }

    fn events(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

struct World {
    store: MemoryChatStore,
    sessions: RoomSessions,
    room: RoomId,
}

async fn world() -> World {
    let store = MemoryChatStore::new();
    let owner = store.create_user("owner").await.unwrap();
    let room = store
        .create_room(NewRoom {
            name: "R1".to_string(),
            password: None,
            owner_id: owner.id,
        })
        .await
        .unwrap();
    let sessions = RoomSessions::new(Arc::new(store.clone()));
    World {
        store,
        sessions,
        room: room.id,
    }
}

impl World {
    async fn client(&self, nickname: &str) -> Client {
        let user = self.store.create_user(nickname).await.unwrap();
        Client::connect(&self.sessions, user).await
    }

    async fn join(&self, client: &Client) {
        self.sessions
            .join(&client.conn, self.room, client.user.id, false)
            .await
            .unwrap();
    }

    async fn send(&self, client: &Client, text: &str) {
        self.sessions
            .send_message(&client.conn, self.room, client.user.id, text)
            .await
            .unwrap();
    }

    async fn participant_count(&self) -> u64 {
        self.store.get_room(self.room).await.unwrap().unwrap().participant_count
    }

    async fn unread(&self, client: &Client) -> u64 {
        self.sessions
            .read_state()
            .unread_count_for_user(client.user.id)
            .await
            .unwrap()
    }

    fn room_update(&self, participant_count: u64) -> ServerEvent {
        ServerEvent::RoomUpdate {
            room_id: self.room,
            participant_count,
        }
    }
}

#[tokio::test]
async fn first_join_announces_count() {
    let w = world().await;
    let mut alice = w.client("alice").await;

    w.join(&alice).await;

    assert_eq!(w.participant_count().await, 1);
    assert_eq!(alice.events(), vec![w.room_update(1)]);
}

#[tokio::test]
async fn message_sent_alone_stays_unread() {
    let w = world().await;
    let mut alice = w.client("alice").await;
    let bob_user = w.store.create_user("bob").await.unwrap();
    w.join(&alice).await;
    alice.events();

    w.send(&alice, "hi").await;

    let messages = w.store.list_messages(w.room).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].is_read);
    assert_eq!(messages[0].nickname, "alice");

    // the sender gets the echo
    match alice.events().as_slice() {
        [ServerEvent::ReceiveMessage(msg)] => assert_eq!(msg.message, "hi"),
        other => panic!("Unexpected events: {:?}", other),
    }

    // alice never counts her own message
    assert_eq!(w.unread(&alice).await, 0);
    let bob_unread = w
        .sessions
        .read_state()
        .unread_count_for_user(bob_user.id)
        .await
        .unwrap();
    assert_eq!(bob_unread, 1);
}

#[tokio::test]
async fn second_user_join_marks_backlog_read() {
    let w = world().await;
    let mut alice = w.client("alice").await;
    w.join(&alice).await;
    w.send(&alice, "hi").await;
    alice.events();

    let mut bob = w.client("bob").await;
    w.join(&bob).await;

    let messages = w.store.list_messages(w.room).await.unwrap();
    assert!(messages[0].is_read);
    assert_eq!(w.unread(&bob).await, 0);
    assert_eq!(w.participant_count().await, 2);

    // both subscribers see the same announcement
    assert_eq!(alice.events(), vec![w.room_update(2)]);
    assert_eq!(bob.events(), vec![w.room_update(2)]);
}

#[tokio::test]
async fn message_with_live_peer_is_read_immediately() {
    let w = world().await;
    let carol = w.store.create_user("carol").await.unwrap();
    let mut alice = w.client("alice").await;
    let mut bob = w.client("bob").await;
    w.join(&alice).await;
    w.join(&bob).await;

    // a backlog addressed to bob from a third sender
    w.store
        .append_message(roomchat_shared::ChatMessage::new(w.room, carol.nickname.as_str(), "earlier", false))
        .await
        .unwrap();
    assert_eq!(w.unread(&bob).await, 1);
    alice.events();
    bob.events();

    w.send(&alice, "you there?").await;

    let messages = w.store.list_messages(w.room).await.unwrap();
    let sent = messages.iter().find(|m| m.message == "you there?").unwrap();
    assert!(sent.is_read);
    assert_eq!(w.unread(&bob).await, 0);

    for client in [&mut alice, &mut bob] {
        match client.events().as_slice() {
            [ServerEvent::ReceiveMessage(msg)] => assert_eq!(msg.id, sent.id),
            other => panic!("Unexpected events: {:?}", other),
        }
    }
}

#[tokio::test]
async fn disconnect_keeps_participant_count() {
    let w = world().await;
    let mut alice = w.client("alice").await;
    let bob = w.client("bob").await;
    w.join(&alice).await;
    w.join(&bob).await;
    alice.events();

    w.sessions.disconnect(bob.conn.id).await;

    assert_eq!(alice.events(), vec![w.room_update(2)]);
    assert_eq!(w.participant_count().await, 2);
    assert_eq!(w.sessions.ws_state().rooms.get_room_size(&w.room).await, 1);
    assert_eq!(w.sessions.ws_state().connection_count().await, 1);
}

#[tokio::test]
async fn count_tracks_distinct_users_not_connections() {
    let w = world().await;
    let alice_user = w.store.create_user("alice").await.unwrap();
    let tab_one = Client::connect(&w.sessions, alice_user.clone()).await;
    let tab_two = Client::connect(&w.sessions, alice_user).await;

    w.join(&tab_one).await;
    w.join(&tab_two).await;
    assert_eq!(w.participant_count().await, 1);

    w.sessions.disconnect(tab_one.conn.id).await;
    w.sessions.disconnect(tab_two.conn.id).await;
    assert_eq!(w.participant_count().await, 1);
    assert_eq!(w.store.participant_rows(w.room).await, 1);
}

#[tokio::test]
async fn rooms_are_isolated() {
    let w = world().await;
    let other_room = w
        .store
        .create_room(NewRoom {
            name: "R2".to_string(),
            password: None,
            owner_id: w.store.create_user("owner2").await.unwrap().id,
        })
        .await
        .unwrap();
    let mut alice = w.client("alice").await;
    let mut bob = w.client("bob").await;
    w.join(&alice).await;
    w.sessions
        .join(&bob.conn, other_room.id, bob.user.id, false)
        .await
        .unwrap();
    alice.events();
    bob.events();

    w.send(&alice, "only R1").await;

    assert_eq!(alice.events().len(), 1);
    assert!(bob.events().is_empty());
    // nobody else was live in R1
    assert!(!w.store.list_messages(w.room).await.unwrap()[0].is_read);
}

#[tokio::test]
async fn concurrent_joins_produce_one_row_per_user() {
    let w = world().await;
    let user = w.store.create_user("alice").await.unwrap();
    let mut clients = Vec::new();
    for _ in 0..8 {
        clients.push(Client::connect(&w.sessions, user.clone()).await);
    }

    let handles: Vec<_> = clients
        .iter()
        .map(|client| {
            let sessions = w.sessions.clone();
            let conn = Arc::clone(&client.conn);
            let room = w.room;
            let user_id = client.user.id;
            tokio::spawn(async move { sessions.join(&conn, room, user_id, false).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    assert_eq!(w.store.participant_rows(w.room).await, 1);
    assert_eq!(w.sessions.ws_state().rooms.get_room_size(&w.room).await, 8);
}
