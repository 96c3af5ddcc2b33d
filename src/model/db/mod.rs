//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way: IDs and
//! datetimes use MongoDB's own formats.

pub mod audit;
pub mod ballot;
pub mod candidate;
pub mod position;
pub mod schedule;
pub mod voter;

pub use audit::{AuditEntry, AuditEntryCore, NewAuditEntry};
pub use ballot::{Ballot, BallotCore, NewBallot};
pub use candidate::{Candidate, CandidateCore, NewCandidate};
pub use position::{NewPosition, Position, PositionCore};
pub use schedule::{NewSchedule, Schedule, ScheduleCore};
pub use voter::{NewVoter, Voter, VoterCore};
