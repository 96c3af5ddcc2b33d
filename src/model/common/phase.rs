use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Phases in a track's election lifecycle, advanced in order by the central
/// commissioner. Date boundaries bound operations *within* a phase; the
/// marker never moves backwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionPhase {
    /// Candidate applications are being accepted.
    Nomination,
    /// Applications are under commissioner review; withdrawal is still open
    /// up to the withdrawal deadline.
    Scrutiny,
    /// Ballots are being accepted within the voting window.
    Voting,
    /// Results have been declared.
    Completed,
}

impl ElectionPhase {
    /// The phase the marker may advance to, if any.
    pub fn next(self) -> Option<ElectionPhase> {
        match self {
            ElectionPhase::Nomination => Some(ElectionPhase::Scrutiny),
            ElectionPhase::Scrutiny => Some(ElectionPhase::Voting),
            ElectionPhase::Voting => Some(ElectionPhase::Completed),
            ElectionPhase::Completed => None,
        }
    }
}

impl std::fmt::Display for ElectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElectionPhase::Nomination => "nomination",
            ElectionPhase::Scrutiny => "scrutiny",
            ElectionPhase::Voting => "voting",
            ElectionPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

impl From<ElectionPhase> for Bson {
    fn from(phase: ElectionPhase) -> Self {
        to_bson(&phase).expect("Serialisation is infallible")
    }
}
