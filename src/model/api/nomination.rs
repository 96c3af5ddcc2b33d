use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{HallName, NominationStatus, Track},
    db::Candidate,
    mongodb::Id,
};

/// A candidate application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NominationRequest {
    pub track: Track,
    pub position_id: Id,
    /// Required on the hall track and must match the applicant's own hall;
    /// must be absent on the central track.
    pub hall: Option<HallName>,
    pub proposer_id: Id,
    pub seconder_id: Id,
    pub manifesto: String,
    /// Opaque reference returned by external file storage.
    pub photo: Option<String>,
}

/// A scrutiny verdict on a single nomination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrutinyRequest {
    pub decision: ScrutinyDecision,
    /// Required (non-empty) when rejecting.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrutinyDecision {
    Approve,
    Reject,
}

impl ScrutinyDecision {
    pub fn target_status(self) -> NominationStatus {
        match self {
            ScrutinyDecision::Approve => NominationStatus::Approved,
            ScrutinyDecision::Reject => NominationStatus::Rejected,
        }
    }
}

/// Per-nomination outcome of a bulk scrutiny call. A multi-id call never
/// collapses into a single aggregate flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrutinyOutcome {
    pub nomination_id: Id,
    pub approved: bool,
    /// The specific reason this id failed, if it did.
    pub error: Option<String>,
}

/// API-facing view of a nomination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NominationDescription {
    pub id: Id,
    pub name: String,
    pub position_id: Id,
    pub track: Track,
    pub hall: Option<HallName>,
    pub manifesto: String,
    pub photo: Option<String>,
    pub status: NominationStatus,
    pub rejection_reason: Option<String>,
    pub nominated_at: DateTime<Utc>,
}

impl From<Candidate> for NominationDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.candidate.name,
            position_id: candidate.candidate.position_id,
            track: candidate.candidate.track,
            hall: candidate.candidate.hall,
            manifesto: candidate.candidate.manifesto,
            photo: candidate.candidate.photo,
            status: candidate.candidate.status,
            rejection_reason: candidate.candidate.rejection_reason,
            nominated_at: candidate.candidate.nominated_at,
        }
    }
}
