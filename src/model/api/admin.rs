use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ElectionPhase, Track},
    db::{PositionCore, ScheduleCore},
};

/// Specification of a position, as submitted by the central commissioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSpec {
    pub name: String,
    pub track: Track,
    pub order: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<PositionSpec> for PositionCore {
    fn from(spec: PositionSpec) -> Self {
        Self {
            name: spec.name,
            track: spec.track,
            order: spec.order,
            active: spec.active,
        }
    }
}

/// Specification of a new schedule for one track. The new schedule starts in
/// the nomination phase and supersedes any currently active schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub track: Track,
    pub nomination_start: DateTime<Utc>,
    pub nomination_end: DateTime<Utc>,
    pub withdrawal_deadline: DateTime<Utc>,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
}

impl From<ScheduleSpec> for ScheduleCore {
    fn from(spec: ScheduleSpec) -> Self {
        Self {
            track: spec.track,
            nomination_start: spec.nomination_start,
            nomination_end: spec.nomination_end,
            withdrawal_deadline: spec.withdrawal_deadline,
            voting_start: spec.voting_start,
            voting_end: spec.voting_end,
            phase: ElectionPhase::Nomination,
            result_declared_at: None,
            active: true,
        }
    }
}
