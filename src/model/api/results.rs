use serde::{Deserialize, Serialize};

use crate::model::{
    common::{HallName, Track},
    mongodb::Id,
};

/// One candidate's line in a position result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStanding {
    pub candidate_id: Id,
    pub name: String,
    pub votes: u64,
    /// Share of the valid votes, rounded to two decimals. Absent when no
    /// valid votes exist against which a share could be computed (the
    /// uncontested case still reports 100.00).
    pub percentage: Option<f64>,
}

/// The tally for one position.
///
/// The winner is the highest vote count; ties are broken by candidate name
/// in lexicographic order so that the output is deterministic and
/// reproducible from a fixture. An uncontested position (exactly one
/// approved candidate) is won outright at 100.00 even with zero ballots.
/// With several candidates and no ballots at all there is no winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionResults {
    pub position_id: Id,
    pub total_valid_votes: u64,
    pub winner: Option<Id>,
    /// Standings ordered by (votes desc, name asc).
    pub candidates: Vec<CandidateStanding>,
}

impl PositionResults {
    /// Compute the result from the approved candidates' cached counts.
    pub fn compute(position_id: Id, raw: Vec<(Id, String, u64)>) -> Self {
        let total_valid_votes: u64 = raw.iter().map(|(_, _, votes)| votes).sum();
        let uncontested = raw.len() == 1;

        let mut candidates: Vec<CandidateStanding> = raw
            .into_iter()
            .map(|(candidate_id, name, votes)| {
                let percentage = if total_valid_votes > 0 {
                    Some(round2(votes as f64 * 100.0 / total_valid_votes as f64))
                } else if uncontested {
                    Some(100.0)
                } else {
                    None
                };
                CandidateStanding {
                    candidate_id,
                    name,
                    votes,
                    percentage,
                }
            })
            .collect();
        candidates.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));

        let winner = match candidates.first() {
            None => None,
            Some(first) if total_valid_votes > 0 || uncontested => Some(first.candidate_id),
            Some(_) => None,
        };

        Self {
            position_id,
            total_valid_votes,
            winner,
            candidates,
        }
    }
}

/// Participation in one track, optionally scoped to a hall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turnout {
    pub track: Track,
    pub hall: Option<HallName>,
    /// Verified, active voters in scope.
    pub eligible: u64,
    /// Distinct voters with at least one ballot in the track.
    pub voted: u64,
    pub percentage: f64,
}

impl Turnout {
    pub fn new(track: Track, hall: Option<HallName>, eligible: u64, voted: u64) -> Self {
        let percentage = if eligible > 0 {
            round2(voted as f64 * 100.0 / eligible as f64)
        } else {
            0.0
        };
        Self {
            track,
            hall,
            eligible,
            voted,
            percentage,
        }
    }
}

/// A candidate whose cached vote counter disagrees with the ballot count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterMismatch {
    pub candidate_id: Id,
    pub cached: u64,
    pub counted: u64,
}

/// Outcome of recounting every candidate's ballots against its cached
/// counter. Any mismatch is a correctness bug, not an approximation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub checked: u64,
    pub mismatches: Vec<CounterMismatch>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
