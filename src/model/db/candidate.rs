use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{HallName, NominationStatus, Track},
    mongodb::{serde_option_chrono_datetime, Id},
};

/// Core nomination data, as stored in the database: one user's bid for one
/// position in one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    /// The applicant.
    pub voter_id: Id,
    /// Candidate name, denormalized from the applicant for display and for
    /// the deterministic winner tie-break.
    pub name: String,
    pub position_id: Id,
    pub track: Track,
    /// `Some` iff the track is hall-scoped.
    pub hall: Option<HallName>,
    pub proposer_id: Id,
    pub seconder_id: Id,
    pub manifesto: String,
    /// Opaque reference into external file storage.
    pub photo: Option<String>,
    /// Denormalized ballot count; incremented in the same transaction as
    /// every ballot insert and reconcilable against the ballot collection.
    pub votes: u64,
    pub status: NominationStatus,
    /// Required on rejection, cleared again on approval.
    pub rejection_reason: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub nominated_at: DateTime<Utc>,
    #[serde(with = "serde_option_chrono_datetime")]
    pub scrutinized_at: Option<DateTime<Utc>>,
    #[serde(with = "serde_option_chrono_datetime")]
    pub withdrawn_at: Option<DateTime<Utc>>,
}

/// A nomination ready for DB insertion is just a nomination without an ID.
pub type NewCandidate = CandidateCore;

/// A nomination from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;
    use crate::model::db::{position::Position, voter::Voter};

    impl CandidateCore {
        /// A fresh pending nomination by `applicant` for `position`, with
        /// placeholder proposer/seconder references.
        pub fn pending_example(applicant: &Voter, position: &Position) -> Self {
            Self {
                voter_id: applicant.id,
                name: applicant.name.clone(),
                position_id: position.id,
                track: position.track,
                hall: position
                    .track
                    .is_hall_scoped()
                    .then(|| applicant.hall.clone()),
                proposer_id: Id::new(),
                seconder_id: Id::new(),
                manifesto: "A better campus for everyone.".to_string(),
                photo: None,
                votes: 0,
                status: NominationStatus::Pending,
                rejection_reason: None,
                nominated_at: Utc::now(),
                scrutinized_at: None,
                withdrawn_at: None,
            }
        }
    }
}
