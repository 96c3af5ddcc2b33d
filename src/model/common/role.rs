use mongodb::bson::Bson;
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::Track;

/// The closed set of account roles.
///
/// Authorization is always decided by the capability methods below plus a
/// hall-scope re-check against the target record, never by ad-hoc
/// comparisons at call sites.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Role {
    /// May cast ballots once verified.
    Voter = 0,
    /// A voter who may additionally stand for a position.
    CandidateEligible = 1,
    /// Runs scrutiny and voter verification for one residence hall.
    HallCommissioner = 2,
    /// Runs the central election and administers reference data.
    CentralCommissioner = 3,
}

impl Role {
    pub fn is_commissioner(self) -> bool {
        matches!(self, Role::HallCommissioner | Role::CentralCommissioner)
    }

    /// May this role submit a nomination?
    pub fn may_contest(self) -> bool {
        matches!(self, Role::CandidateEligible)
    }

    /// May this role create positions and schedules, and advance phases?
    pub fn may_administer(self) -> bool {
        matches!(self, Role::CentralCommissioner)
    }

    /// May this role scrutinize nominations in the given track?
    /// The central commissioner covers both tracks (administrative
    /// override); a hall commissioner only the hall track, and only for
    /// their own hall, which callers must re-check against the record.
    pub fn may_scrutinize(self, track: Track) -> bool {
        match self {
            Role::CentralCommissioner => true,
            Role::HallCommissioner => track.is_hall_scoped(),
            _ => false,
        }
    }

    /// May this role verify or reject voter registrations?
    pub fn may_verify_voters(self) -> bool {
        self.is_commissioner()
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        Bson::Int32(role as i32)
    }
}
