use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{ElectionPhase, Track},
    mongodb::{serde_option_chrono_datetime, Id},
};

/// The active timetable for one track.
///
/// The phase marker is advanced explicitly by the central commissioner; the
/// date boundaries bound operations within their phase (nominations close at
/// `nomination_end`, withdrawal at `withdrawal_deadline`, ballots are only
/// accepted inside the voting window). Superseding a schedule deactivates
/// the predecessor rather than deleting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleCore {
    pub track: Track,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub nomination_start: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub nomination_end: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub withdrawal_deadline: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub voting_start: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub voting_end: DateTime<Utc>,
    pub phase: ElectionPhase,
    #[serde(with = "serde_option_chrono_datetime")]
    pub result_declared_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl ScheduleCore {
    /// Boundaries must be strictly increasing.
    pub fn validate(&self) -> Result<()> {
        let boundaries = [
            (self.nomination_start, self.nomination_end, "nomination_end"),
            (
                self.nomination_end,
                self.withdrawal_deadline,
                "withdrawal_deadline",
            ),
            (self.withdrawal_deadline, self.voting_start, "voting_start"),
            (self.voting_start, self.voting_end, "voting_end"),
        ];
        for (earlier, later, field) in boundaries {
            if later <= earlier {
                return Err(Error::validation(format!(
                    "Schedule boundary {field} must come strictly after its predecessor"
                )));
            }
        }
        Ok(())
    }

    /// Nominations require the nomination phase and a date no later than the
    /// nomination end.
    pub fn allows_nomination(&self, now: DateTime<Utc>) -> bool {
        self.phase == ElectionPhase::Nomination && now <= self.nomination_end
    }

    /// Withdrawal is open from submission up to the withdrawal deadline,
    /// regardless of whether scrutiny has begun.
    pub fn allows_withdrawal(&self, now: DateTime<Utc>) -> bool {
        self.phase != ElectionPhase::Completed && now <= self.withdrawal_deadline
    }

    /// Ballots require the voting phase and the voting window.
    pub fn allows_voting(&self, now: DateTime<Utc>) -> bool {
        self.phase == ElectionPhase::Voting
            && now >= self.voting_start
            && now <= self.voting_end
    }
}

/// A schedule ready for DB insertion is just a schedule without an ID.
pub type NewSchedule = ScheduleCore;

/// A schedule from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub schedule: ScheduleCore,
}

impl Deref for Schedule {
    type Target = ScheduleCore;

    fn deref(&self) -> &Self::Target {
        &self.schedule
    }
}

impl DerefMut for Schedule {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.schedule
    }
}


#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn boundaries_must_strictly_increase() {
        let mut schedule = ScheduleCore::nominating_example(Track::Jucsu);
        assert!(schedule.validate().is_ok());

        schedule.withdrawal_deadline = schedule.nomination_end;
        assert!(schedule.validate().is_err());

        schedule.withdrawal_deadline = schedule.nomination_end - Duration::days(1);
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn nomination_window_closes_at_deadline() {
        let schedule = ScheduleCore::nominations_closed_example(Track::Jucsu);
        // Phase marker still says nomination, but the date boundary rules.
        assert!(!schedule.allows_nomination(Utc::now()));
        assert!(schedule.allows_nomination(schedule.nomination_end - Duration::hours(1)));
    }

    #[test]
    fn voting_requires_phase_and_window() {
        let schedule = ScheduleCore::voting_example(Track::Hall);
        assert!(schedule.allows_voting(Utc::now()));
        assert!(!schedule.allows_voting(schedule.voting_end + Duration::seconds(1)));

        let mut not_open = schedule.clone();
        not_open.phase = ElectionPhase::Scrutiny;
        assert!(!not_open.allows_voting(Utc::now()));
    }
}
