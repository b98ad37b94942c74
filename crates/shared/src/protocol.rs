use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Entry, EntryId, Game};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLoginRequest {
    pub password: String,
}

/// Signed admin session issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AdminSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEntryRequest {
    pub name: String,
    pub points: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Game>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPointsRequest {
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyEntryRequest {
    pub games: Vec<Game>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEntriesQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Game>,
}

/// Change notification pushed to every subscriber of the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LeaderboardEvent {
    EntryUpserted { entry: Entry },
    EntryDeleted { entry_id: EntryId },
    LeaderboardCleared,
    /// The subscriber missed events and must re-fetch the full entry set.
    ResyncRequired,
}
