use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in a nomination's lifecycle.
///
/// The only legal transitions are the ones `may_become` admits:
///
/// ```text
/// Pending  -> Approved | Rejected | Withdrawn
/// Approved -> Rejected | Withdrawn
/// ```
///
/// `Rejected` and `Withdrawn` are terminal. Status writes always filter on
/// the expected current status, so an illegal transition is rejected before
/// any write even under concurrent scrutiny.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NominationStatus {
    /// Submitted, awaiting scrutiny.
    Pending,
    /// Cleared scrutiny; the only status a ballot may reference.
    Approved,
    /// Refused at scrutiny, or administratively overridden. Terminal.
    Rejected,
    /// Withdrawn by the applicant. Terminal.
    Withdrawn,
}

impl NominationStatus {
    /// Is the requested transition legal?
    pub fn may_become(self, next: NominationStatus) -> bool {
        use NominationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Withdrawn)
                | (Approved, Rejected)
                | (Approved, Withdrawn)
        )
    }

    /// Pending and approved nominations occupy the applicant's single slot
    /// per track.
    pub fn is_active(self) -> bool {
        matches!(self, NominationStatus::Pending | NominationStatus::Approved)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NominationStatus::Rejected | NominationStatus::Withdrawn)
    }
}

impl std::fmt::Display for NominationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NominationStatus::Pending => "pending",
            NominationStatus::Approved => "approved",
            NominationStatus::Rejected => "rejected",
            NominationStatus::Withdrawn => "withdrawn",
        };
        f.write_str(name)
    }
}

impl From<NominationStatus> for Bson {
    fn from(status: NominationStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::NominationStatus::*;

    const ALL: [super::NominationStatus; 4] = [Pending, Approved, Rejected, Withdrawn];

    #[test]
    fn transition_matrix() {
        for from in ALL {
            for to in ALL {
                let legal = matches!(
                    (from, to),
                    (Pending, Approved)
                        | (Pending, Rejected)
                        | (Pending, Withdrawn)
                        | (Approved, Rejected)
                        | (Approved, Withdrawn)
                );
                assert_eq!(from.may_become(to), legal, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn terminal_states_never_transition() {
        for to in ALL {
            assert!(!Rejected.may_become(to));
            assert!(!Withdrawn.may_become(to));
        }
    }

    #[test]
    fn active_statuses() {
        assert!(Pending.is_active());
        assert!(Approved.is_active());
        assert!(!Rejected.is_active());
        assert!(!Withdrawn.is_active());
    }
}
