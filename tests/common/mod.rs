#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use notes_collab::config::Config;
use notes_collab::protocol::{decode_frame, AwarenessUpdate, AwarenessUpdateEntry, Message, SyncMessage};
use notes_collab::{build_app, AppState};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, Update};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Config for tests: no keepalive pings unless a test asks for them.
pub fn test_config() -> Config {
    Config {
        ping_interval_secs: 0,
        ..Config::default()
    }
}

/// Start the full app on an ephemeral port.
pub async fn start_server(config: Config) -> (SocketAddr, AppState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(config);
    let app = build_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

/// A browser-like editor: a socket plus its own replica of the note.
pub struct Editor {
    pub ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub doc: Doc,
}

impl Editor {
    /// Connects and consumes the initial full-state and state-vector frames,
    /// applying the full state to the local replica.
    pub async fn join(addr: SocketAddr, room: &str, client_id: u64) -> Self {
        Self::join_url(&format!("ws://{addr}/collaboration/{room}"), client_id).await
    }

    pub async fn join_url(url: &str, client_id: u64) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let mut editor = Self {
            ws,
            doc: Doc::with_client_id(client_id),
        };
        match editor.recv().await {
            Message::Sync(SyncMessage::SyncStep2(state)) => apply(&editor.doc, &state),
            other => panic!("expected full state first, got {other:?}"),
        }
        match editor.recv().await {
            Message::Sync(SyncMessage::SyncStep1(_)) => {}
            other => panic!("expected state vector second, got {other:?}"),
        }
        editor
    }

    pub async fn send(&mut self, message: Message) {
        self.send_raw(message.encode_v1()).await;
    }

    pub async fn send_raw(&mut self, frame: Vec<u8>) {
        self.ws.send(WsMessage::Binary(frame.into())).await.unwrap();
    }

    pub async fn recv(&mut self) -> Message {
        self.try_recv(RECV_TIMEOUT)
            .await
            .expect("timed out waiting for a frame")
    }

    pub async fn try_recv(&mut self, wait: Duration) -> Option<Message> {
        loop {
            let next = timeout(wait, self.ws.next()).await.ok()??;
            match next.ok()? {
                WsMessage::Binary(data) => return Some(decode_frame(&data).unwrap()),
                WsMessage::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// Local edit, sent to the server as an update.
    pub async fn type_text(&mut self, index: u32, chunk: &str) {
        let update = insert(&self.doc, index, chunk);
        self.send(Message::Sync(SyncMessage::Update(update))).await;
    }

    /// Sends a state-vector request and waits for its answer, applying
    /// every update seen on the way. Frames are handled in order per
    /// socket, so everything sent before has been processed afterwards.
    pub async fn barrier(&mut self) -> Vec<Message> {
        let sv = self.doc.transact().state_vector();
        self.send(Message::Sync(SyncMessage::SyncStep1(sv))).await;
        let mut seen = Vec::new();
        loop {
            match self.recv().await {
                Message::Sync(SyncMessage::SyncStep2(update)) => {
                    apply(&self.doc, &update);
                    return seen;
                }
                other => {
                    self.absorb(&other);
                    seen.push(other);
                }
            }
        }
    }

    /// Applies a relayed update to the local replica.
    pub fn absorb(&self, message: &Message) {
        if let Message::Sync(SyncMessage::Update(update)) = message {
            apply(&self.doc, update);
        }
    }

    pub async fn announce(&mut self, client_id: u64, clock: u32, state: &str) {
        let entry = AwarenessUpdateEntry {
            clock,
            json: Arc::from(state),
        };
        let update = AwarenessUpdate {
            clients: [(client_id, entry)].into_iter().collect(),
        };
        self.send(Message::Awareness(update)).await;
    }

    pub fn text(&self) -> String {
        text_of(&self.doc)
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

pub fn insert(doc: &Doc, index: u32, chunk: &str) -> Vec<u8> {
    let text = doc.get_or_insert_text("quill");
    let before = doc.transact().state_vector();
    {
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, index, chunk);
    }
    doc.transact().encode_diff_v1(&before)
}

pub fn apply(doc: &Doc, update: &[u8]) {
    let mut txn = doc.transact_mut();
    txn.apply_update(Update::decode_v1(update).unwrap()).unwrap();
}

pub fn text_of(doc: &Doc) -> String {
    let text = doc.get_or_insert_text("quill");
    let txn = doc.transact();
    text.get_string(&txn)
}

pub fn empty_state_vector() -> StateVector {
    StateVector::default()
}
