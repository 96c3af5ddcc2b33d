use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{HallName, Track},
    mongodb::Id,
};

/// Core ballot data, as stored in the database. Uniqueness on
/// `(voter_id, position_id, track)` is enforced by the collection index, so
/// of two concurrent casts for the same position exactly one can exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCore {
    pub voter_id: Id,
    pub candidate_id: Id,
    pub position_id: Id,
    pub track: Track,
    /// The voter's hall, denormalized for turnout reporting.
    pub hall: HallName,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    /// Free-form client metadata (user agent, remote address) for the audit
    /// trail; never interpreted.
    pub client_meta: Option<String>,
}

impl BallotCore {
    pub fn new(
        voter_id: Id,
        candidate_id: Id,
        position_id: Id,
        track: Track,
        hall: HallName,
        client_meta: Option<String>,
    ) -> Self {
        Self {
            voter_id,
            candidate_id,
            position_id,
            track,
            hall,
            cast_at: Utc::now(),
            client_meta,
        }
    }
}

/// A ballot ready for DB insertion is just a ballot without an ID.
pub type NewBallot = BallotCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}

impl DerefMut for Ballot {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ballot
    }
}
