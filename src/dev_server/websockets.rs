use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Upgrade route for browser sockets
pub const WEB_SOCKET_PATH: &str = "/wds";

/// Client module injected into served HTML
pub const WEB_SOCKET_CLIENT_PATH: &str = "/__web-dev-server__web-socket.js";

pub const WEB_SOCKET_CLIENT_SCRIPT: &str = r#"const protocol = location.protocol === 'https:' ? 'wss' : 'ws';
export const webSocket = new WebSocket(`${protocol}://${location.host}/wds`);
const pending = [];

export function sendMessage(message) {
  const text = JSON.stringify(message);
  if (webSocket.readyState === WebSocket.OPEN) {
    webSocket.send(text);
  } else {
    pending.push(text);
  }
}

webSocket.addEventListener('open', () => {
  while (pending.length) webSocket.send(pending.shift());
});

webSocket.addEventListener('message', async (event) => {
  try {
    const message = JSON.parse(event.data);
    if (message.type === 'import') {
      await import(message.data.importPath);
    } else if (message.type === 'reload') {
      location.reload();
    }
  } catch (error) {
    console.error('[devkit] failed to handle web socket message', error);
  }
});
"#;

/// A JSON message received from a browser: `{ "type": ..., ...rest }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketData {
    /// Id of the sending client, assigned by the server
    #[serde(skip)]
    pub client_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Tracks open browser sockets, broadcasts to them and fans out what they send.
#[derive(Clone)]
pub struct WebSocketsManager {
    clients: Arc<DashMap<String, mpsc::UnboundedSender<String>>>,
    incoming: broadcast::Sender<WebSocketData>,
}

impl WebSocketsManager {
    pub fn new() -> Self {
        let (incoming, _) = broadcast::channel(256);
        Self {
            clients: Arc::new(DashMap::new()),
            incoming,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send `message` to every open socket. Returns how many clients received it.
    pub fn send(&self, message: &str) -> usize {
        let mut closed = Vec::new();
        let mut delivered = 0;

        for client in self.clients.iter() {
            if client.value().send(message.to_string()).is_ok() {
                delivered += 1;
            } else {
                closed.push(client.key().clone());
            }
        }

        for id in closed {
            self.clients.remove(&id);
        }
        delivered
    }

    /// Make every browser import `import_path`
    pub fn send_import(&self, import_path: &str) -> usize {
        let message = json!({ "type": "import", "data": { "importPath": import_path } });
        self.send(&message.to_string())
    }

    pub fn send_console_log(&self, text: &str) -> usize {
        let literal = Value::String(text.to_string()).to_string();
        self.send_import(&format!("data:text/javascript,console.log({});", literal))
    }

    /// Messages received from any client from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WebSocketData> {
        self.incoming.subscribe()
    }

    pub(crate) fn register_client(&self) -> (String, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(id.clone(), tx);
        (id, rx)
    }

    pub(crate) fn handle_incoming(&self, client_id: &str, text: &str) {
        match serde_json::from_str::<WebSocketData>(text) {
            Ok(mut data) => {
                data.client_id = client_id.to_string();
                // no subscribers is fine
                let _ = self.incoming.send(data);
            }
            Err(e) => tracing::debug!("Ignoring web socket message from {}: {}", client_id, e),
        }
    }

    /// Drive one upgraded socket until the browser disconnects
    pub async fn handle_socket(self, socket: WebSocket) {
        let (client_id, mut outgoing) = self.register_client();
        let (mut sender, mut receiver) = socket.split();
        tracing::debug!("🔌 Web socket connected: {}", client_id);

        let forward = tokio::spawn(async move {
            while let Some(text) = outgoing.recv().await {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => self.handle_incoming(&client_id, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }

        self.clients.remove(&client_id);
        forward.abort();
        tracing::debug!("🔌 Web socket closed: {}", client_id);
    }
}

impl Default for WebSocketsManager {
    fn default() -> Self {
        Self::new()
    }
}
