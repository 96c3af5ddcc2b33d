use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Every state-changing action the backend performs, as recorded in the
/// audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    VoterRegistered,
    VoterVerified,
    VoterRejected,
    NominationSubmitted,
    NominationApproved,
    NominationRejected,
    NominationWithdrawn,
    VoteCast,
    PositionCreated,
    PositionModified,
    ScheduleCreated,
    PhaseAdvanced,
    ResultsDeclared,
}

impl From<AuditAction> for Bson {
    fn from(action: AuditAction) -> Self {
        to_bson(&action).expect("Serialisation is infallible")
    }
}
