use chrono::Utc;
use mongodb::bson::{self, doc};
use mongodb::Client;
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::results::{
            CounterMismatch, PositionResults, ReconciliationReport, Turnout,
        },
        auth::{AuthToken, CentralCommissioner, Commissioner},
        common::{AuditAction, ElectionPhase, HallName, NominationStatus, Track},
        db::{audit, Ballot, Candidate, NewAuditEntry, Position, Schedule, Voter},
        mongodb::{transaction, Coll, Id, MongoCollection},
    },
};

pub fn routes() -> Vec<Route> {
    routes![position_results, turnout, declare_results, reconcile]
}

/// `GetPositionResults`: the tally for one position, computed from the
/// cached per-candidate counters. Hall-track queries should scope to a hall.
#[get("/positions/<position_id>/results?<hall>")]
pub async fn position_results(
    position_id: Id,
    hall: Option<HallName>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
) -> Result<Json<PositionResults>> {
    positions
        .find_one(position_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Position {position_id}")))?;

    let mut filter = doc! {
        "position_id": position_id,
        "status": NominationStatus::Approved,
    };
    if let Some(hall) = &hall {
        filter.insert("hall", hall.as_str());
    }

    let approved: Vec<Candidate> = candidates.find(filter, None).await?.try_collect().await?;
    let raw = approved
        .into_iter()
        .map(|candidate| {
            (
                candidate.id,
                candidate.candidate.name,
                candidate.candidate.votes,
            )
        })
        .collect();

    Ok(Json(PositionResults::compute(position_id, raw)))
}

/// `GetTurnout`: eligible vs. voted, per track, optionally per hall.
#[get("/turnout?<track>&<hall>")]
pub async fn turnout(
    track: Track,
    hall: Option<HallName>,
    voters: Coll<Voter>,
    ballots: Coll<Ballot>,
) -> Result<Json<Turnout>> {
    let mut eligible_filter = doc! { "verified": true, "active": true };
    let mut ballot_filter = doc! { "track": track };
    if let Some(hall) = &hall {
        eligible_filter.insert("hall", hall.as_str());
        // The ballot's denormalized hall scopes the voted count.
        ballot_filter.insert("hall", hall.as_str());
    }

    let eligible = voters.count_documents(eligible_filter, None).await?;
    let voted = ballots
        .distinct("voter_id", ballot_filter, None)
        .await?
        .len() as u64;

    Ok(Json(Turnout::new(track, hall, eligible, voted)))
}

/// `DeclareResults`: complete the track and stamp the declaration date.
///
/// Declaring an already-completed track is an idempotent success: the state
/// is unchanged, the original stamp is kept, and nothing further is audited.
#[post("/schedules/<track>/declare")]
pub async fn declare_results(
    token: AuthToken<CentralCommissioner>,
    track: Track,
    schedules: Coll<Schedule>,
    audit_entries: Coll<NewAuditEntry>,
    db_client: &State<Client>,
) -> Result<()> {
    let mut session = transaction::start(db_client).await?;
    let result = async {
        let schedule = schedules
            .find_one_with_session(doc! { "track": track, "active": true }, None, &mut session)
            .await?
            .ok_or_else(|| Error::not_found(format!("Active schedule for the {track} track")))?;

        if schedule.phase == ElectionPhase::Completed {
            return Ok(());
        }

        let now = Utc::now();
        let update_result = schedules
            .update_one_with_session(
                doc! { "_id": schedule.id, "phase": schedule.phase },
                doc! {
                    "$set": {
                        "phase": ElectionPhase::Completed,
                        "result_declared_at": bson::DateTime::from_chrono(now),
                    }
                },
                None,
                &mut session,
            )
            .await?;
        assert_eq!(update_result.modified_count, 1);

        audit::record(
            &audit_entries,
            &mut session,
            token.id,
            AuditAction::ResultsDeclared,
            Schedule::NAME,
            schedule.id,
            Some(doc! { "phase": schedule.phase }),
            Some(doc! { "phase": ElectionPhase::Completed }),
        )
        .await?;

        info!("Results declared for the {track} track");
        Ok(())
    }
    .await;

    match result {
        Ok(()) => transaction::commit(&mut session).await,
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

/// Recount every candidate's ballots against its cached counter. Any
/// mismatch means an invariant was broken somewhere and is worth an alarm.
#[get("/reconciliation")]
pub async fn reconcile(
    _token: AuthToken<Commissioner>,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
) -> Result<Json<ReconciliationReport>> {
    let all: Vec<Candidate> = candidates.find(None, None).await?.try_collect().await?;

    let mut checked = 0;
    let mut mismatches = Vec::new();
    for candidate in all {
        let counted = ballots
            .count_documents(doc! { "candidate_id": candidate.id }, None)
            .await?;
        checked += 1;
        if counted != candidate.votes {
            warn!(
                "Vote counter mismatch for candidate {}: cached {} vs counted {}",
                candidate.id, candidate.votes, counted
            );
            mismatches.push(CounterMismatch {
                candidate_id: candidate.id,
                cached: candidate.votes,
                counted,
            });
        }
    }

    Ok(Json(ReconciliationReport { checked, mismatches }))
}
