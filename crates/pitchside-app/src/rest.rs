// HTTP + websocket backend for a hosted Postgres-as-a-service project.
//
// Auth goes through `/auth/v1`, table reads and inserts through `/rest/v1`,
// and row changes on the streams table arrive over the realtime websocket as
// Phoenix channel frames.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use pitchside_core::mapper::{AuthUser, MatchRow, StreamInsert, StreamRow};

use crate::backend::{AuthChange, AuthSession, Backend, BackendError, RowChange, Subscription};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_TOPIC: &str = "realtime:public:data";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<AuthSession>>,
    auth_tx: broadcast::Sender<AuthChange>,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let (auth_tx, _) = broadcast::channel(32);
        RestBackend {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session: Mutex::new(None),
            auth_tx,
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bearer token: the user's access token when signed in, else the anon key.
    fn bearer(&self) -> String {
        self.session()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn store_session(&self, session: AuthSession) {
        info!("Signed in as {}", session.user.id);
        *self.session() = Some(session.clone());
        let _ = self.auth_tx.send(AuthChange::SignedIn(session));
    }

    async fn read_rows<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, BackendError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(request_error)?;
        let body = checked_body(response).await?;
        serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        Ok(self.session().clone())
    }

    fn auth_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.auth_tx.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<(), BackendError> {
        let response = self
            .request(reqwest::Method::POST, "/auth/v1/token?grant_type=password")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(request_error)?;
        let body = checked_auth_body(response).await?;
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
        self.store_session(AuthSession {
            access_token: token.access_token,
            user: token.user,
        });
        Ok(())
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<(), BackendError> {
        let response = self
            .request(reqwest::Method::POST, "/auth/v1/signup")
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "name": name, "role": "creator" }
            }))
            .send()
            .await
            .map_err(request_error)?;
        let body = checked_auth_body(response).await?;

        // Projects without email confirmation answer with a full session.
        if body.get("access_token").is_some() {
            let token: TokenResponse =
                serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
            self.store_session(AuthSession {
                access_token: token.access_token,
                user: token.user,
            });
        } else {
            info!("Sign-up for {email} is awaiting confirmation");
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let had_session = self.session().is_some();
        if had_session {
            let result = self
                .request(reqwest::Method::POST, "/auth/v1/logout")
                .send()
                .await;
            if let Err(e) = result {
                warn!("Logout request failed, clearing session locally: {e}");
            }
        }
        *self.session() = None;
        let _ = self.auth_tx.send(AuthChange::SignedOut);
        Ok(())
    }

    async fn fetch_streams(&self) -> Result<Vec<StreamRow>, BackendError> {
        self.read_rows("/rest/v1/streams?select=*&order=is_live.desc,created_at.desc")
            .await
    }

    async fn fetch_matches(&self) -> Result<Vec<MatchRow>, BackendError> {
        self.read_rows("/rest/v1/matches?select=*&order=date.asc").await
    }

    async fn insert_stream(&self, row: StreamInsert) -> Result<StreamRow, BackendError> {
        let response = self
            .request(reqwest::Method::POST, "/rest/v1/streams")
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(request_error)?;
        let body = checked_body(response).await?;
        let mut rows: Vec<StreamRow> =
            serde_json::from_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(BackendError::Decode("insert returned no rows".into()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn subscribe_streams(&self, capacity: usize) -> Result<Subscription, BackendError> {
        let url = realtime_url(&self.base_url, &self.anon_key);
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| BackendError::Request(format!("realtime connect: {e}")))?;
        info!("Realtime connected, joining {CHANNEL_TOPIC}");

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (mut write, read) = ws.split();
        let join = join_frame(&self.bearer());

        let transport = tokio::spawn(async move {
            if let Err(e) = write.send(Message::Text(join.into())).await {
                warn!("Realtime join failed: {e}");
                return;
            }
            let heartbeat = async move {
                let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
                ticker.tick().await;
                let mut seq: u64 = 1;
                loop {
                    ticker.tick().await;
                    seq += 1;
                    if write
                        .send(Message::Text(heartbeat_frame(seq).into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            };
            tokio::select! {
                end = forward_changes(read, &tx) => debug!("Realtime feed ended: {end:?}"),
                _ = heartbeat => warn!("Realtime heartbeat stopped"),
            }
            debug!("Realtime transport finished");
        });

        Ok(Subscription::new(rx, Some(transport)))
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

fn request_error(e: reqwest::Error) -> BackendError {
    BackendError::Request(e.to_string())
}

/// Parse a JSON body, turning non-2xx statuses into `Rejected`.
///
/// The status is checked first, so an error page that is not JSON still
/// reports the status.
async fn checked_body(response: reqwest::Response) -> Result<Value, BackendError> {
    let status = response.status();
    let text = response.text().await.map_err(request_error)?;
    if !status.is_success() {
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        return Err(BackendError::Rejected(error_message(&body, status)));
    }
    serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Like `checked_body`, but non-2xx statuses are auth failures.
async fn checked_auth_body(response: reqwest::Response) -> Result<Value, BackendError> {
    match checked_body(response).await {
        Err(BackendError::Rejected(msg)) => Err(BackendError::Auth(msg)),
        other => other,
    }
}

/// The human-readable message of an error body.
fn error_message(body: &Value, status: reqwest::StatusCode) -> String {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("status {status}"))
}

// ---------------------------------------------------------------------------
// Realtime frames
// ---------------------------------------------------------------------------

pub(crate) fn realtime_url(base_url: &str, anon_key: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };
    format!("{ws_base}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0")
}

fn join_frame(access_token: &str) -> String {
    json!({
        "topic": CHANNEL_TOPIC,
        "event": "phx_join",
        "payload": {
            "config": {
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": "streams" }
                ]
            },
            "access_token": access_token
        },
        "ref": "1"
    })
    .to_string()
}

fn heartbeat_frame(seq: u64) -> String {
    json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": seq.to_string() })
        .to_string()
}

/// Decode one channel frame into a streams-table change.
///
/// Accepts both the `postgres_changes` envelope (`payload.data`) and the
/// older frame where the change sits directly in `payload`. Replies,
/// heartbeats, presence and other tables yield `None`.
pub fn parse_realtime_frame(text: &str) -> Option<RowChange> {
    let frame: Value = serde_json::from_str(text).ok()?;
    let payload = frame.get("payload")?;
    let change = payload.get("data").unwrap_or(payload);

    if let Some(table) = change.get("table").and_then(Value::as_str) {
        if table != "streams" {
            return None;
        }
    }

    let record = |key: &str| -> Option<StreamRow> {
        serde_json::from_value(change.get(key)?.clone()).ok()
    };

    match change.get("type").and_then(Value::as_str)? {
        "INSERT" => record("record").map(RowChange::Insert),
        "UPDATE" => record("record").map(RowChange::Update),
        "DELETE" => record("old_record")
            .and_then(|row| row.id)
            .map(|id| RowChange::Delete { id }),
        _ => None,
    }
}

/// Why `forward_changes` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEnd {
    /// Close frame, transport error or end of stream.
    Closed,
    /// The change receiver was dropped.
    ReceiverGone,
}

/// Read frames from `stream` and forward decoded changes through `tx`.
pub async fn forward_changes<St>(mut stream: St, tx: &mpsc::Sender<RowChange>) -> FeedEnd
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let Some(change) = parse_realtime_frame(text.as_str()) else {
                    continue;
                };
                if tx.send(change).await.is_err() {
                    return FeedEnd::ReceiverGone;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Realtime server closed the channel");
                break;
            }
            Err(e) => {
                warn!("Realtime transport error: {e}");
                break;
            }
            _ => {}
        }
    }
    FeedEnd::Closed
}
