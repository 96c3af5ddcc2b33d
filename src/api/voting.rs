use chrono::Utc;
use mongodb::bson::{doc, to_document};
use mongodb::{Client, ClientSession};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::voting::{VoteRequest, VoteReceipt},
        auth::{AnyActor, AuthToken},
        common::{AuditAction, NominationStatus, Track},
        db::{
            audit,
            voter::VotedFlags,
            Ballot, BallotCore, Candidate, NewAuditEntry, NewBallot, Position, Schedule, Voter,
        },
        mongodb::{
            errors::is_duplicate_key_error,
            transaction::{self, MAX_TRANSACTION_ATTEMPTS},
            Coll, Id, MongoCollection,
        },
    },
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, my_votes]
}

/// The collections a ballot touches.
struct VotingColls {
    voters: Coll<Voter>,
    positions: Coll<Position>,
    schedules: Coll<Schedule>,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
    new_ballots: Coll<NewBallot>,
    audit_entries: Coll<NewAuditEntry>,
}

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for VotingColls {
    type Error = ();

    async fn from_request(
        req: &'r rocket::Request<'_>,
    ) -> rocket::request::Outcome<Self, Self::Error> {
        let db = req
            .guard::<&State<mongodb::Database>>()
            .await
            .unwrap();
        rocket::request::Outcome::Success(Self {
            voters: Coll::from_db(db),
            positions: Coll::from_db(db),
            schedules: Coll::from_db(db),
            candidates: Coll::from_db(db),
            ballots: Coll::from_db(db),
            new_ballots: Coll::from_db(db),
            audit_entries: Coll::from_db(db),
        })
    }
}

/// `CastVote`.
///
/// The ballot insert, the candidate counter increment, the completion-flag
/// update, and the audit entry all execute in one transaction; the unique
/// ballot index arbitrates concurrent double-submissions, so retrying an
/// identical request after a success deterministically yields
/// `AlreadyVoted` and can never double-count. Only transient transaction
/// conflicts are retried here; business outcomes surface immediately.
#[post("/votes", data = "<request>", format = "json")]
pub async fn cast_vote(
    token: AuthToken<AnyActor>,
    request: Json<VoteRequest>,
    colls: VotingColls,
    db_client: &State<Client>,
) -> Result<Json<VoteReceipt>> {
    let mut attempt = 0;
    let receipt = loop {
        match try_cast(&token, &request, &colls, db_client).await {
            Err(err) if transaction::is_transient(&err) && attempt + 1 < MAX_TRANSACTION_ATTEMPTS => {
                attempt += 1;
                transaction::backoff(attempt).await;
            }
            other => break other.map_err(transaction::into_exhausted),
        }
    }?;

    Ok(Json(receipt))
}

/// The positions the caller has already voted for in a track.
#[get("/votes/mine?<track>")]
pub async fn my_votes(
    token: AuthToken<AnyActor>,
    track: Track,
    ballots: Coll<Ballot>,
) -> Result<Json<Vec<Id>>> {
    let mine = ballots
        .find(doc! { "voter_id": token.id, "track": track }, None)
        .await?
        .try_collect::<Vec<_>>()
        .await?;
    Ok(Json(mine.into_iter().map(|ballot| ballot.position_id).collect()))
}

async fn try_cast(
    token: &AuthToken<AnyActor>,
    request: &VoteRequest,
    colls: &VotingColls,
    db_client: &Client,
) -> Result<VoteReceipt> {
    let mut session = transaction::start(db_client).await?;
    let result = cast_in_session(token, request, colls, &mut session).await;
    match result {
        Ok(receipt) => {
            transaction::commit(&mut session).await?;
            Ok(receipt)
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

async fn cast_in_session(
    token: &AuthToken<AnyActor>,
    request: &VoteRequest,
    colls: &VotingColls,
    session: &mut ClientSession,
) -> Result<VoteReceipt> {
    let now = Utc::now();

    // (1) The track must be inside its voting window.
    let schedule = colls
        .schedules
        .find_one_with_session(
            doc! { "track": request.track, "active": true },
            None,
            session,
        )
        .await?
        .ok_or_else(|| {
            Error::phase_closed(format!(
                "No election is currently scheduled for the {} track",
                request.track
            ))
        })?;
    if !schedule.allows_voting(now) {
        return Err(Error::phase_closed(format!(
            "The {} track is not accepting ballots",
            request.track
        )));
    }

    // (2) The voter must be verified and active, per the stored record.
    let voter = colls
        .voters
        .find_one_with_session(token.id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::NotEligible("Voter account no longer exists".to_string()))?;
    if !voter.is_eligible_to_vote() {
        return Err(Error::NotEligible(
            "Only verified, active voters may cast a ballot".to_string(),
        ));
    }

    // (3) The position must be active in the requested track.
    let position = colls
        .positions
        .find_one_with_session(request.position_id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::reference(format!("Position {}", request.position_id)))?;
    if position.track != request.track || !position.active {
        return Err(Error::reference(format!(
            "Position '{}' is not open in the {} track",
            position.name, request.track
        )));
    }

    // (4) The candidate must be approved and bound to exactly this
    // position, track, and (on the hall track) the voter's own hall.
    let candidate = colls
        .candidates
        .find_one_with_session(request.candidate_id.as_doc(), None, session)
        .await?
        .ok_or_else(|| {
            Error::InvalidCandidate(format!("Candidate {} does not exist", request.candidate_id))
        })?;
    if candidate.status != NominationStatus::Approved {
        return Err(Error::InvalidCandidate(format!(
            "The nomination of {} is {}, not approved",
            candidate.name, candidate.status
        )));
    }
    if candidate.position_id != position.id || candidate.track != request.track {
        return Err(Error::InvalidCandidate(format!(
            "{} is not contesting '{}' in the {} track",
            candidate.name, position.name, request.track
        )));
    }
    if request.track.is_hall_scoped() && candidate.hall.as_ref() != Some(&voter.hall) {
        return Err(Error::InvalidCandidate(format!(
            "{} is not contesting in {}",
            candidate.name, voter.hall
        )));
    }

    // (5) Insert the ballot. The unique index on (voter, position, track)
    // decides races: exactly one of two concurrent submissions can exist.
    let ballot = BallotCore::new(
        voter.id,
        candidate.id,
        position.id,
        request.track,
        voter.hall.clone(),
        request.client_meta.clone(),
    );
    let ballot_id: Id = colls
        .new_ballots
        .insert_one_with_session(&ballot, None, session)
        .await
        .map_err(|err| {
            if is_duplicate_key_error(&err) {
                Error::AlreadyVoted(format!(
                    "A ballot for '{}' has already been recorded for this voter",
                    position.name
                ))
            } else {
                err.into()
            }
        })?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    // (6) Increment the candidate's cached tally in the same transaction.
    let update_result = colls
        .candidates
        .update_one_with_session(
            doc! { "_id": candidate.id, "status": NominationStatus::Approved },
            doc! { "$inc": { "votes": 1 } },
            None,
            session,
        )
        .await?;
    assert_eq!(update_result.modified_count, 1);

    // (7) If the voter now holds a ballot for every active position in the
    // track, flag them as having voted.
    let cast = colls
        .ballots
        .count_documents_with_session(
            doc! { "voter_id": voter.id, "track": request.track },
            None,
            session,
        )
        .await?;
    let contested = colls
        .positions
        .count_documents_with_session(
            doc! { "track": request.track, "active": true },
            None,
            session,
        )
        .await?;
    if cast == contested {
        colls
            .voters
            .update_one_with_session(
                voter.id.as_doc(),
                doc! { "$set": { VotedFlags::field_name(request.track): true } },
                None,
                session,
            )
            .await?;
    }

    // (8) Audit the cast; failure aborts the whole transaction.
    audit::record(
        &colls.audit_entries,
        session,
        voter.id,
        AuditAction::VoteCast,
        Ballot::NAME,
        ballot_id,
        None,
        Some(to_document(&ballot).expect("Serialisation is infallible")),
    )
    .await?;

    debug!("Ballot {ballot_id} recorded for '{}'", position.name);
    Ok(VoteReceipt {
        ballot_id,
        position_id: position.id,
        cast_at: ballot.cast_at,
    })
}
