use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{common::Track, mongodb::Id};

/// A ballot the voter wishes to cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub track: Track,
    pub position_id: Id,
    pub candidate_id: Id,
    /// Free-form client metadata recorded on the ballot.
    pub client_meta: Option<String>,
}

/// Acknowledgement of a recorded ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub ballot_id: Id,
    pub position_id: Id,
    pub cast_at: DateTime<Utc>,
}
