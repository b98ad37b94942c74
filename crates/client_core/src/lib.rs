use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Entry, EntryId, Game},
    error::{ApiError, ApiException},
    protocol::{
        AddEntryRequest, AdminLoginRequest, AdminSession, ClearResponse, CopyEntryRequest,
        LeaderboardEvent, ListEntriesQuery, SetPointsRequest,
    },
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

pub mod controller;
pub mod error;
pub mod reducer;
pub mod view;

pub use controller::{ImportSummary, LeaderboardController};
pub use error::{ClientError, ClientResult};

const FEED_BUFFER: usize = 64;

/// Remote operations the leaderboard UI depends on. Mutating calls carry the
/// admin session whose token authorizes them.
#[async_trait]
pub trait LeaderboardService: Send + Sync {
    async fn list_entries(&self, game: Option<&Game>) -> ClientResult<Vec<Entry>>;
    async fn list_games(&self) -> ClientResult<Vec<Game>>;
    async fn admin_login(&self, password: &str) -> ClientResult<AdminSession>;
    async fn add_entry(
        &self,
        session: &AdminSession,
        request: AddEntryRequest,
    ) -> ClientResult<Entry>;
    async fn set_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
        points: i64,
    ) -> ClientResult<Entry>;
    async fn increment_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
    ) -> ClientResult<Entry>;
    async fn decrement_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
    ) -> ClientResult<Entry>;
    async fn delete_entry(&self, session: &AdminSession, entry_id: EntryId) -> ClientResult<()>;
    async fn clear_entries(&self, session: &AdminSession) -> ClientResult<u64>;
    async fn copy_entry(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
        games: Vec<Game>,
    ) -> ClientResult<Vec<Entry>>;
}

/// HTTP client for the leaderboard server.
#[derive(Clone)]
pub struct LeaderboardClient {
    http: Client,
    base_url: Url,
}

impl LeaderboardClient {
    pub fn new(server_url: &str) -> ClientResult<Self> {
        let mut base_url = Url::parse(server_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    pub async fn health(&self) -> ClientResult<()> {
        let res = self.http.get(self.endpoint("healthz")?).send().await?;
        check(res).await?;
        Ok(())
    }

    /// Opens the server's change feed. The reader task ends when the returned
    /// feed is dropped or the server closes the socket.
    pub async fn subscribe_changes(&self) -> ClientResult<ChangeFeed> {
        let mut ws_url = self.endpoint("ws")?;
        let scheme = match ws_url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(ClientError::Feed(format!(
                    "server url must use http or https, got {other}"
                )))
            }
        };
        ws_url
            .set_scheme(scheme)
            .map_err(|_| ClientError::Feed(format!("cannot derive websocket url from {ws_url}")))?;

        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|err| ClientError::Feed(format!("failed to connect {ws_url}: {err}")))?;
        info!(%ws_url, "subscribed to leaderboard changes");
        let (_, mut ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let task = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let (event, fatal) = match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<LeaderboardEvent>(&text) {
                            Ok(event) => (Ok(event), false),
                            Err(err) => {
                                warn!(%err, "received malformed change event");
                                let err = ClientError::Feed(format!("malformed change event: {err}"));
                                (Err(err), false)
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        let err = ClientError::Feed(format!("websocket receive failed: {err}"));
                        (Err(err), true)
                    }
                };
                if tx.send(event).await.is_err() || fatal {
                    break;
                }
            }
        });

        Ok(ChangeFeed { events: rx, task })
    }

    fn authed(&self, builder: RequestBuilder, session: &AdminSession) -> RequestBuilder {
        builder.bearer_auth(&session.token)
    }
}

#[async_trait]
impl LeaderboardService for LeaderboardClient {
    async fn list_entries(&self, game: Option<&Game>) -> ClientResult<Vec<Entry>> {
        let query = ListEntriesQuery {
            game: game.cloned(),
        };
        let res = self
            .http
            .get(self.endpoint("entries")?)
            .query(&query)
            .send()
            .await?;
        decode(res).await
    }

    async fn list_games(&self) -> ClientResult<Vec<Game>> {
        let res = self.http.get(self.endpoint("games")?).send().await?;
        decode(res).await
    }

    async fn admin_login(&self, password: &str) -> ClientResult<AdminSession> {
        let res = self
            .http
            .post(self.endpoint("admin/login")?)
            .json(&AdminLoginRequest {
                password: password.to_string(),
            })
            .send()
            .await?;
        decode(res).await
    }

    async fn add_entry(
        &self,
        session: &AdminSession,
        request: AddEntryRequest,
    ) -> ClientResult<Entry> {
        let req = self.http.post(self.endpoint("entries")?).json(&request);
        let res = self.authed(req, session).send().await?;
        decode(res).await
    }

    async fn set_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
        points: i64,
    ) -> ClientResult<Entry> {
        let req = self
            .http
            .put(self.endpoint(&format!("entries/{}/points", entry_id.0))?)
            .json(&SetPointsRequest { points });
        let res = self.authed(req, session).send().await?;
        decode(res).await
    }

    async fn increment_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
    ) -> ClientResult<Entry> {
        let req = self
            .http
            .post(self.endpoint(&format!("entries/{}/increment", entry_id.0))?);
        let res = self.authed(req, session).send().await?;
        decode(res).await
    }

    async fn decrement_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
    ) -> ClientResult<Entry> {
        let req = self
            .http
            .post(self.endpoint(&format!("entries/{}/decrement", entry_id.0))?);
        let res = self.authed(req, session).send().await?;
        decode(res).await
    }

    async fn delete_entry(&self, session: &AdminSession, entry_id: EntryId) -> ClientResult<()> {
        let req = self
            .http
            .delete(self.endpoint(&format!("entries/{}", entry_id.0))?);
        let res = self.authed(req, session).send().await?;
        check(res).await?;
        Ok(())
    }

    async fn clear_entries(&self, session: &AdminSession) -> ClientResult<u64> {
        let req = self.http.delete(self.endpoint("entries")?);
        let res = self.authed(req, session).send().await?;
        let body: ClearResponse = decode(res).await?;
        Ok(body.deleted)
    }

    async fn copy_entry(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
        games: Vec<Game>,
    ) -> ClientResult<Vec<Entry>> {
        let req = self
            .http
            .post(self.endpoint(&format!("entries/{}/copy", entry_id.0))?)
            .json(&CopyEntryRequest { games });
        let res = self.authed(req, session).send().await?;
        decode(res).await
    }
}

/// Converts a non-success response into the server's structured error when
/// the body carries one, and a plain status error otherwise.
async fn check(res: Response) -> ClientResult<Response> {
    let Err(status_err) = res.error_for_status_ref().map(|_| ()) else {
        return Ok(res);
    };
    let body = res.bytes().await?;
    match serde_json::from_slice::<ApiError>(&body) {
        Ok(api) => Err(ApiException::from(api).into()),
        Err(_) => Err(status_err.into()),
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> ClientResult<T> {
    Ok(check(res).await?.json().await?)
}

/// Live stream of change notifications from the server.
pub struct ChangeFeed {
    events: mpsc::Receiver<ClientResult<LeaderboardEvent>>,
    task: JoinHandle<()>,
}

impl ChangeFeed {
    /// Next change, or `None` once the connection is gone. A malformed event
    /// is yielded as an error so the caller can resync; a transport failure
    /// is yielded once before the feed ends.
    pub async fn next(&mut self) -> Option<ClientResult<LeaderboardEvent>> {
        self.events.recv().await
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
