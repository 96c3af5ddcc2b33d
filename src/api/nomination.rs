use chrono::Utc;
use mongodb::bson::{self, doc, to_document, Bson};
use mongodb::{Client, ClientSession};
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::nomination::{
            NominationDescription, NominationRequest, ScrutinyDecision, ScrutinyOutcome,
            ScrutinyRequest,
        },
        auth::{AnyActor, AuthToken, Commissioner},
        common::{AuditAction, NominationStatus, Track},
        db::{
            audit, Candidate, CandidateCore, NewAuditEntry, NewCandidate, Position, Schedule,
            Voter,
        },
        mongodb::{
            errors::is_duplicate_key_error,
            transaction::{self, MAX_TRANSACTION_ATTEMPTS},
            Coll, Id, MongoCollection,
        },
    },
    notify::{Notification, Notifier},
};

pub fn routes() -> Vec<Route> {
    routes![submit_nomination, scrutinize, bulk_scrutinize, withdraw]
}

/// The collections the nomination workflow touches.
struct NominationColls {
    voters: Coll<Voter>,
    positions: Coll<Position>,
    schedules: Coll<Schedule>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
    audit_entries: Coll<NewAuditEntry>,
}

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for NominationColls {
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
            new_candidates: Coll::from_db(db),
            audit_entries: Coll::from_db(db),
        })
    }
}

/// `SubmitNomination`: candidate application intake.
#[post("/nominations", data = "<request>", format = "json")]
pub async fn submit_nomination(
    token: AuthToken<AnyActor>,
    request: Json<NominationRequest>,
    colls: NominationColls,
    notifier: &State<Notifier>,
    db_client: &State<Client>,
) -> Result<Json<NominationDescription>> {
    if request.manifesto.trim().is_empty() {
        return Err(Error::validation("A nomination requires a manifesto"));
    }

    let mut attempt = 0;
    let (candidate, position_name) = loop {
        match try_submit(&token, &request, &colls, db_client).await {
            Err(err) if transaction::is_transient(&err) && attempt + 1 < MAX_TRANSACTION_ATTEMPTS => {
                attempt += 1;
                transaction::backoff(attempt).await;
            }
            other => break other.map_err(transaction::into_exhausted),
        }
    }?;

    notifier.send(Notification::NominationSubmitted {
        applicant: candidate.name.clone(),
        position: position_name,
        track: candidate.track,
    });

    Ok(Json(candidate.into()))
}

async fn try_submit(
    token: &AuthToken<AnyActor>,
    request: &NominationRequest,
    colls: &NominationColls,
    db_client: &Client,
) -> Result<(Candidate, String)> {
    let mut session = transaction::start(db_client).await?;
    let result = submit_in_session(token, request, colls, &mut session).await;
    match result {
        Ok(value) => {
            transaction::commit(&mut session).await?;
            Ok(value)
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

async fn submit_in_session(
    token: &AuthToken<AnyActor>,
    request: &NominationRequest,
    colls: &NominationColls,
    session: &mut ClientSession,
) -> Result<(Candidate, String)> {
    let now = Utc::now();

    // Phase gate: the track must be nominating and the deadline not passed.
    let schedule = active_schedule(&colls.schedules, request.track, session).await?;
    if !schedule.allows_nomination(now) {
        return Err(Error::phase_closed(format!(
            "The {} track is not accepting nominations",
            request.track
        )));
    }

    // The applicant must be an eligible, verified, active contestant.
    let applicant = colls
        .voters
        .find_one_with_session(token.id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::authorization("Applicant account no longer exists"))?;
    if !applicant.role.may_contest() {
        return Err(Error::validation(
            "Only candidate-eligible voters may submit a nomination",
        ));
    }
    if !applicant.is_eligible_to_vote() {
        return Err(Error::validation(
            "Applicant must be verified and active to contest",
        ));
    }

    // Applicant, proposer, and seconder are three distinct voters.
    if request.proposer_id == request.seconder_id
        || request.proposer_id == applicant.id
        || request.seconder_id == applicant.id
    {
        return Err(Error::validation(
            "Applicant, proposer, and seconder must be three distinct voters",
        ));
    }

    let proposer = active_voter(&colls.voters, request.proposer_id, "Proposer", session).await?;
    let seconder = active_voter(&colls.voters, request.seconder_id, "Seconder", session).await?;

    // Hall consistency per track.
    let hall = match request.track {
        Track::Hall => {
            let hall = request
                .hall
                .clone()
                .ok_or_else(|| Error::validation("Hall nominations must name the hall"))?;
            if hall != applicant.hall {
                return Err(Error::validation(
                    "Nominated hall must be the applicant's own hall",
                ));
            }
            if proposer.hall != applicant.hall || seconder.hall != applicant.hall {
                return Err(Error::validation(
                    "Proposer and seconder must belong to the applicant's hall",
                ));
            }
            Some(hall)
        }
        Track::Jucsu => {
            if request.hall.is_some() {
                return Err(Error::validation(
                    "Central-track nominations must not name a hall",
                ));
            }
            None
        }
    };

    // The position must be open in the requested track.
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

    // One active nomination per applicant per track. The partial unique
    // index backs this check against concurrent submissions.
    let duplicate = format!(
        "{} already has an active nomination in the {} track",
        applicant.name, request.track
    );
    let existing = colls
        .candidates
        .find_one_with_session(
            doc! {
                "voter_id": applicant.id,
                "track": request.track,
                "status": { "$in": [NominationStatus::Pending, NominationStatus::Approved] },
            },
            None,
            session,
        )
        .await?;
    if existing.is_some() {
        return Err(Error::DuplicateNomination(duplicate));
    }

    let core = CandidateCore {
        voter_id: applicant.id,
        name: applicant.name.clone(),
        position_id: position.id,
        track: request.track,
        hall,
        proposer_id: proposer.id,
        seconder_id: seconder.id,
        manifesto: request.manifesto.clone(),
        photo: request.photo.clone(),
        votes: 0,
        status: NominationStatus::Pending,
        rejection_reason: None,
        nominated_at: now,
        scrutinized_at: None,
        withdrawn_at: None,
    };
    let new_id: Id = colls
        .new_candidates
        .insert_one_with_session(&core, None, session)
        .await
        .map_err(|err| {
            if is_duplicate_key_error(&err) {
                Error::DuplicateNomination(duplicate)
            } else {
                err.into()
            }
        })?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    audit::record(
        &colls.audit_entries,
        session,
        applicant.id,
        AuditAction::NominationSubmitted,
        Candidate::NAME,
        new_id,
        None,
        Some(to_document(&core).expect("Serialisation is infallible")),
    )
    .await?;

    info!("Nomination {new_id} submitted for '{}'", position.name);
    Ok((
        Candidate {
            id: new_id,
            candidate: core,
        },
        position.position.name,
    ))
}

/// `Scrutinize`: approve or reject a single nomination.
#[post("/nominations/<nomination_id>/scrutiny", data = "<verdict>", format = "json")]
pub async fn scrutinize(
    token: AuthToken<Commissioner>,
    nomination_id: Id,
    verdict: Json<ScrutinyRequest>,
    colls: NominationColls,
    notifier: &State<Notifier>,
    db_client: &State<Client>,
) -> Result<()> {
    let (candidate, position_name) = apply_scrutiny(
        &token,
        nomination_id,
        verdict.decision,
        verdict.reason.as_deref(),
        &colls,
        db_client,
    )
    .await?;

    notifier.send(Notification::NominationScrutinized {
        applicant: candidate.name.clone(),
        position: position_name,
        approved: verdict.decision == ScrutinyDecision::Approve,
    });

    Ok(())
}

/// `BulkScrutinize`: approve many nominations, each validated and audited
/// independently. The response always reports one outcome per id.
#[post("/nominations/scrutiny/bulk", data = "<nomination_ids>", format = "json")]
pub async fn bulk_scrutinize(
    token: AuthToken<Commissioner>,
    nomination_ids: Json<Vec<Id>>,
    colls: NominationColls,
    notifier: &State<Notifier>,
    db_client: &State<Client>,
) -> Result<Json<Vec<ScrutinyOutcome>>> {
    let mut outcomes = Vec::with_capacity(nomination_ids.len());
    for &nomination_id in nomination_ids.iter() {
        let outcome = apply_scrutiny(
            &token,
            nomination_id,
            ScrutinyDecision::Approve,
            None,
            &colls,
            db_client,
        )
        .await;
        match outcome {
            Ok((candidate, position_name)) => {
                notifier.send(Notification::NominationScrutinized {
                    applicant: candidate.name.clone(),
                    position: position_name,
                    approved: true,
                });
                outcomes.push(ScrutinyOutcome {
                    nomination_id,
                    approved: true,
                    error: None,
                });
            }
            Err(err) => outcomes.push(ScrutinyOutcome {
                nomination_id,
                approved: false,
                error: Some(err.to_string()),
            }),
        }
    }
    Ok(Json(outcomes))
}

async fn apply_scrutiny(
    token: &AuthToken<Commissioner>,
    nomination_id: Id,
    decision: ScrutinyDecision,
    reason: Option<&str>,
    colls: &NominationColls,
    db_client: &Client,
) -> Result<(Candidate, String)> {
    let mut attempt = 0;
    loop {
        match try_scrutiny(token, nomination_id, decision, reason, colls, db_client).await {
            Err(err) if transaction::is_transient(&err) && attempt + 1 < MAX_TRANSACTION_ATTEMPTS => {
                attempt += 1;
                transaction::backoff(attempt).await;
            }
            other => break other.map_err(transaction::into_exhausted),
        }
    }
}

async fn try_scrutiny(
    token: &AuthToken<Commissioner>,
    nomination_id: Id,
    decision: ScrutinyDecision,
    reason: Option<&str>,
    colls: &NominationColls,
    db_client: &Client,
) -> Result<(Candidate, String)> {
    let mut session = transaction::start(db_client).await?;
    let result = scrutiny_in_session(token, nomination_id, decision, reason, colls, &mut session)
        .await;
    match result {
        Ok(value) => {
            transaction::commit(&mut session).await?;
            Ok(value)
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

async fn scrutiny_in_session(
    token: &AuthToken<Commissioner>,
    nomination_id: Id,
    decision: ScrutinyDecision,
    reason: Option<&str>,
    colls: &NominationColls,
    session: &mut ClientSession,
) -> Result<(Candidate, String)> {
    let now = Utc::now();

    let candidate = colls
        .candidates
        .find_one_with_session(nomination_id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Nomination {nomination_id}")))?;

    // The authorization boundary: scope is re-checked against the record's
    // own track and hall, never only the caller's claimed role.
    if !token.has_scope_over(candidate.track, candidate.hall.as_ref()) {
        return Err(Error::authorization(format!(
            "Nomination {nomination_id} is outside this commissioner's scope"
        )));
    }

    let target = decision.target_status();
    if !candidate.status.may_become(target) {
        return Err(Error::InvalidStateTransition {
            from: candidate.status,
            to: target,
        });
    }

    let reason = match decision {
        ScrutinyDecision::Reject => {
            let reason = reason.map(str::trim).unwrap_or_default();
            if reason.is_empty() {
                return Err(Error::validation("A rejection requires a non-empty reason"));
            }
            Some(reason.to_string())
        }
        // Approval clears any reason left by an earlier rejection attempt.
        ScrutinyDecision::Approve => None,
    };

    let update = doc! {
        "$set": {
            "status": target,
            "rejection_reason": reason.as_ref().map(|r| Bson::String(r.clone())).unwrap_or(Bson::Null),
            "scrutinized_at": bson::DateTime::from_chrono(now),
        }
    };
    let update_result = colls
        .candidates
        .update_one_with_session(
            doc! { "_id": nomination_id, "status": candidate.status },
            update,
            None,
            session,
        )
        .await?;
    assert_eq!(update_result.modified_count, 1);

    let after = colls
        .candidates
        .find_one_with_session(nomination_id.as_doc(), None, session)
        .await?
        .unwrap(); // Present: we just updated it.

    let action = match decision {
        ScrutinyDecision::Approve => AuditAction::NominationApproved,
        ScrutinyDecision::Reject => AuditAction::NominationRejected,
    };
    audit::record(
        &colls.audit_entries,
        session,
        token.id,
        action,
        Candidate::NAME,
        nomination_id,
        Some(to_document(&candidate.candidate).expect("Serialisation is infallible")),
        Some(to_document(&after.candidate).expect("Serialisation is infallible")),
    )
    .await?;

    let position_name = position_name(&colls.positions, after.position_id, session).await?;
    info!("Nomination {nomination_id} is now {}", after.status);
    Ok((after, position_name))
}

/// `Withdraw`: the applicant retracts their own nomination.
#[post("/nominations/<nomination_id>/withdraw")]
pub async fn withdraw(
    token: AuthToken<AnyActor>,
    nomination_id: Id,
    colls: NominationColls,
    notifier: &State<Notifier>,
    db_client: &State<Client>,
) -> Result<()> {
    let mut attempt = 0;
    let (candidate, position_name) = loop {
        match try_withdraw(&token, nomination_id, &colls, db_client).await {
            Err(err) if transaction::is_transient(&err) && attempt + 1 < MAX_TRANSACTION_ATTEMPTS => {
                attempt += 1;
                transaction::backoff(attempt).await;
            }
            other => break other.map_err(transaction::into_exhausted),
        }
    }?;

    // One event covers both the applicant and the responsible commissioner
    // role subscribed to the topic.
    notifier.send(Notification::NominationWithdrawn {
        applicant: candidate.name.clone(),
        position: position_name,
        track: candidate.track,
    });

    Ok(())
}

async fn try_withdraw(
    token: &AuthToken<AnyActor>,
    nomination_id: Id,
    colls: &NominationColls,
    db_client: &Client,
) -> Result<(Candidate, String)> {
    let mut session = transaction::start(db_client).await?;
    let result = withdraw_in_session(token, nomination_id, colls, &mut session).await;
    match result {
        Ok(value) => {
            transaction::commit(&mut session).await?;
            Ok(value)
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

async fn withdraw_in_session(
    token: &AuthToken<AnyActor>,
    nomination_id: Id,
    colls: &NominationColls,
    session: &mut ClientSession,
) -> Result<(Candidate, String)> {
    let now = Utc::now();

    let candidate = colls
        .candidates
        .find_one_with_session(nomination_id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Nomination {nomination_id}")))?;

    if candidate.voter_id != token.id {
        return Err(Error::authorization(
            "Only the applicant may withdraw their own nomination",
        ));
    }

    let schedule = active_schedule(&colls.schedules, candidate.track, session).await?;
    if !schedule.allows_withdrawal(now) {
        return Err(Error::phase_closed(format!(
            "The {} track withdrawal deadline has passed",
            candidate.track
        )));
    }

    if !candidate.status.may_become(NominationStatus::Withdrawn) {
        return Err(Error::InvalidStateTransition {
            from: candidate.status,
            to: NominationStatus::Withdrawn,
        });
    }

    let update_result = colls
        .candidates
        .update_one_with_session(
            doc! { "_id": nomination_id, "status": candidate.status },
            doc! {
                "$set": {
                    "status": NominationStatus::Withdrawn,
                    "withdrawn_at": bson::DateTime::from_chrono(now),
                }
            },
            None,
            session,
        )
        .await?;
    assert_eq!(update_result.modified_count, 1);

    let after = colls
        .candidates
        .find_one_with_session(nomination_id.as_doc(), None, session)
        .await?
        .unwrap(); // Present: we just updated it.

    audit::record(
        &colls.audit_entries,
        session,
        token.id,
        AuditAction::NominationWithdrawn,
        Candidate::NAME,
        nomination_id,
        Some(to_document(&candidate.candidate).expect("Serialisation is infallible")),
        Some(to_document(&after.candidate).expect("Serialisation is infallible")),
    )
    .await?;

    let position_name = position_name(&colls.positions, after.position_id, session).await?;
    info!("Nomination {nomination_id} withdrawn");
    Ok((after, position_name))
}

async fn active_schedule(
    schedules: &Coll<Schedule>,
    track: Track,
    session: &mut ClientSession,
) -> Result<Schedule> {
    schedules
        .find_one_with_session(doc! { "track": track, "active": true }, None, session)
        .await?
        .ok_or_else(|| Error::phase_closed(format!("No election is scheduled for the {track} track")))
}

async fn active_voter(
    voters: &Coll<Voter>,
    id: Id,
    role_in_request: &str,
    session: &mut ClientSession,
) -> Result<Voter> {
    voters
        .find_one_with_session(id.as_doc(), None, session)
        .await?
        .filter(|voter| voter.active)
        .ok_or_else(|| Error::reference(format!("{role_in_request} does not reference an active voter")))
}

async fn position_name(
    positions: &Coll<Position>,
    position_id: Id,
    session: &mut ClientSession,
) -> Result<String> {
    Ok(positions
        .find_one_with_session(position_id.as_doc(), None, session)
        .await?
        .map(|position| position.position.name)
        .unwrap_or_else(|| position_id.to_string()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::{self, json},
    };

    use crate::model::db::{
        voter::{EXAMPLE_HALL, EXAMPLE_PASSWORD, OTHER_HALL},
        AuditEntry, NewPosition, NewSchedule, NewVoter, PositionCore, ScheduleCore, VoterCore,
    };

    use super::*;

    async fn insert_voter(new_voters: &Coll<NewVoter>, core: VoterCore) -> Voter {
        let id = new_voters
            .insert_one(&core, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        Voter { id, voter: core }
    }

    async fn insert_position(new_positions: &Coll<NewPosition>, core: PositionCore) -> Position {
        let id = new_positions
            .insert_one(&core, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        Position { id, position: core }
    }

    async fn insert_candidate(new_candidates: &Coll<NewCandidate>, core: CandidateCore) -> Candidate {
        let id = new_candidates
            .insert_one(&core, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        Candidate { id, candidate: core }
    }

    fn nomination_body(position: &Position, proposer: &Voter, seconder: &Voter) -> String {
        json!({
            "track": "hall",
            "position_id": position.id,
            "hall": EXAMPLE_HALL,
            "proposer_id": proposer.id,
            "seconder_id": seconder.id,
            "manifesto": "Better meals, cleaner rooms.",
        })
        .to_string()
    }

    async fn login_as(client: &Client, voter: &VoterCore) {
        client.delete(uri!(crate::api::auth::logout)).dispatch().await;
        let response = client
            .post(uri!(crate::api::auth::login))
            .header(ContentType::JSON)
            .body(
                json!({ "reg_no": voter.reg_no, "password": EXAMPLE_PASSWORD }).to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(voter)]
    async fn hall_nomination_is_submitted_then_approved(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
        candidates: Coll<Candidate>,
        audit_entries: Coll<AuditEntry>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominating_example(Track::Hall), None)
            .await
            .unwrap();
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let proposer = insert_voter(&new_voters, VoterCore::voter_example()).await;
        let seconder = insert_voter(&new_voters, VoterCore::eligible_example2()).await;

        let response = client
            .post(uri!(submit_nomination))
            .header(ContentType::JSON)
            .body(nomination_body(&position, &proposer, &seconder))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let description: NominationDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(description.status, NominationStatus::Pending);
        assert_eq!(description.hall.as_deref(), Some(EXAMPLE_HALL));

        let submitted = audit_entries
            .find_one(
                doc! { "action": AuditAction::NominationSubmitted, "record_id": description.id },
                None,
            )
            .await
            .unwrap();
        assert!(submitted.is_some());

        // The hall's commissioner approves it.
        new_voters
            .insert_one(VoterCore::hall_commissioner_example(), None)
            .await
            .unwrap();
        login_as(&client, &VoterCore::hall_commissioner_example()).await;

        let response = client
            .post(format!("/nominations/{}/scrutiny", description.id))
            .header(ContentType::JSON)
            .body(json!({ "decision": "approve" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let candidate = candidates
            .find_one(doc! { "_id": description.id }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(candidate.status, NominationStatus::Approved);
        assert!(candidate.scrutinized_at.is_some());

        let approved = audit_entries
            .find_one(
                doc! { "action": AuditAction::NominationApproved, "record_id": description.id },
                None,
            )
            .await
            .unwrap();
        assert!(approved.is_some());
    }

    #[backend_test(voter)]
    async fn second_active_nomination_in_track_conflicts(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominating_example(Track::Hall), None)
            .await
            .unwrap();
        let first = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let second = insert_position(
            &new_positions,
            PositionCore::new("Common Room Secretary".to_string(), Track::Hall, 2),
        )
        .await;
        let proposer = insert_voter(&new_voters, VoterCore::voter_example()).await;
        let seconder = insert_voter(&new_voters, VoterCore::eligible_example2()).await;

        let response = client
            .post(uri!(submit_nomination))
            .header(ContentType::JSON)
            .body(nomination_body(&first, &proposer, &seconder))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // A user may not simultaneously contest two positions in one track.
        let response = client
            .post(uri!(submit_nomination))
            .header(ContentType::JSON)
            .body(nomination_body(&second, &proposer, &seconder))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(voter)]
    async fn nomination_after_the_deadline_is_phase_closed(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominations_closed_example(Track::Hall), None)
            .await
            .unwrap();
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let proposer = insert_voter(&new_voters, VoterCore::voter_example()).await;
        let seconder = insert_voter(&new_voters, VoterCore::eligible_example2()).await;

        let response = client
            .post(uri!(submit_nomination))
            .header(ContentType::JSON)
            .body(nomination_body(&position, &proposer, &seconder))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(voter)]
    async fn proposer_and_seconder_must_be_distinct(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominating_example(Track::Hall), None)
            .await
            .unwrap();
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let proposer = insert_voter(&new_voters, VoterCore::voter_example()).await;

        let response = client
            .post(uri!(submit_nomination))
            .header(ContentType::JSON)
            .body(nomination_body(&position, &proposer, &proposer))
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(voter)]
    async fn hall_nomination_requires_shared_hall(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominating_example(Track::Hall), None)
            .await
            .unwrap();
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let mut outsider = VoterCore::voter_example();
        outsider.hall = OTHER_HALL.to_string();
        let proposer = insert_voter(&new_voters, outsider).await;
        let seconder = insert_voter(&new_voters, VoterCore::eligible_example2()).await;

        let response = client
            .post(uri!(submit_nomination))
            .header(ContentType::JSON)
            .body(nomination_body(&position, &proposer, &seconder))
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(hall)]
    async fn rejection_requires_a_reason(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_candidates: Coll<NewCandidate>,
        candidates: Coll<Candidate>,
    ) {
        let applicant = insert_voter(&new_voters, VoterCore::eligible_example()).await;
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let nomination =
            insert_candidate(&new_candidates, CandidateCore::pending_example(&applicant, &position))
                .await;

        let response = client
            .post(format!("/nominations/{}/scrutiny", nomination.id))
            .header(ContentType::JSON)
            .body(json!({ "decision": "reject" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());

        let response = client
            .post(format!("/nominations/{}/scrutiny", nomination.id))
            .header(ContentType::JSON)
            .body(json!({ "decision": "reject", "reason": "Incomplete manifesto" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let rejected = candidates
            .find_one(doc! { "_id": nomination.id }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rejected.status, NominationStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Incomplete manifesto"));
    }

    #[backend_test(hall)]
    async fn terminal_nominations_do_not_transition(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_candidates: Coll<NewCandidate>,
    ) {
        let applicant = insert_voter(&new_voters, VoterCore::eligible_example()).await;
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let mut core = CandidateCore::pending_example(&applicant, &position);
        core.status = NominationStatus::Rejected;
        core.rejection_reason = Some("Late submission".to_string());
        let nomination = insert_candidate(&new_candidates, core).await;

        let response = client
            .post(format!("/nominations/{}/scrutiny", nomination.id))
            .header(ContentType::JSON)
            .body(json!({ "decision": "approve" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(hall)]
    async fn approval_clears_a_stale_rejection_reason(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_candidates: Coll<NewCandidate>,
        candidates: Coll<Candidate>,
    ) {
        let applicant = insert_voter(&new_voters, VoterCore::eligible_example()).await;
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let mut core = CandidateCore::pending_example(&applicant, &position);
        core.rejection_reason = Some("Left over from a draft verdict".to_string());
        let nomination = insert_candidate(&new_candidates, core).await;

        let response = client
            .post(format!("/nominations/{}/scrutiny", nomination.id))
            .header(ContentType::JSON)
            .body(json!({ "decision": "approve" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let approved = candidates
            .find_one(doc! { "_id": nomination.id }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.status, NominationStatus::Approved);
        assert_eq!(approved.rejection_reason, None);
    }

    #[backend_test(hall)]
    async fn hall_commissioner_is_scoped_to_their_hall(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_candidates: Coll<NewCandidate>,
    ) {
        let mut outsider = VoterCore::eligible_example();
        outsider.hall = OTHER_HALL.to_string();
        let applicant = insert_voter(&new_voters, outsider).await;
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let nomination =
            insert_candidate(&new_candidates, CandidateCore::pending_example(&applicant, &position))
                .await;

        let response = client
            .post(format!("/nominations/{}/scrutiny", nomination.id))
            .header(ContentType::JSON)
            .body(json!({ "decision": "approve" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(voter)]
    async fn applicant_withdraws_their_own_nomination(
        client: Client,
        voters: Coll<Voter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
        new_candidates: Coll<NewCandidate>,
        candidates: Coll<Candidate>,
        audit_entries: Coll<AuditEntry>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominating_example(Track::Hall), None)
            .await
            .unwrap();
        let me = voters
            .find_one(doc! { "reg_no": VoterCore::eligible_example().reg_no }, None)
            .await
            .unwrap()
            .unwrap();
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let nomination =
            insert_candidate(&new_candidates, CandidateCore::pending_example(&me, &position)).await;

        let response = client
            .post(format!("/nominations/{}/withdraw", nomination.id))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let withdrawn = candidates
            .find_one(doc! { "_id": nomination.id }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(withdrawn.status, NominationStatus::Withdrawn);
        assert!(withdrawn.withdrawn_at.is_some());

        let audited = audit_entries
            .find_one(
                doc! { "action": AuditAction::NominationWithdrawn, "record_id": nomination.id },
                None,
            )
            .await
            .unwrap();
        assert!(audited.is_some());

        // Withdrawn is terminal.
        let response = client
            .post(format!("/nominations/{}/withdraw", nomination.id))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(voter)]
    async fn only_the_applicant_may_withdraw(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
        new_candidates: Coll<NewCandidate>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominating_example(Track::Hall), None)
            .await
            .unwrap();
        let someone_else = insert_voter(&new_voters, VoterCore::eligible_example2()).await;
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let nomination = insert_candidate(
            &new_candidates,
            CandidateCore::pending_example(&someone_else, &position),
        )
        .await;

        let response = client
            .post(format!("/nominations/{}/withdraw", nomination.id))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(voter)]
    async fn withdrawal_closes_at_the_deadline(
        client: Client,
        voters: Coll<Voter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
        new_candidates: Coll<NewCandidate>,
    ) {
        // The voting-time schedule has its withdrawal deadline in the past.
        new_schedules
            .insert_one(ScheduleCore::voting_example(Track::Hall), None)
            .await
            .unwrap();
        let me = voters
            .find_one(doc! { "reg_no": VoterCore::eligible_example().reg_no }, None)
            .await
            .unwrap()
            .unwrap();
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let nomination = insert_candidate(
            &new_candidates,
            CandidateCore::pending_example(&me, &position),
        )
        .await;

        let response = client
            .post(format!("/nominations/{}/withdraw", nomination.id))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn bulk_scrutiny_reports_one_outcome_per_id(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_candidates: Coll<NewCandidate>,
        audit_entries: Coll<AuditEntry>,
    ) {
        let first = insert_voter(&new_voters, VoterCore::eligible_example()).await;
        let second = insert_voter(&new_voters, VoterCore::eligible_example2()).await;
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;

        let pending_a =
            insert_candidate(&new_candidates, CandidateCore::pending_example(&first, &position))
                .await;
        let pending_b =
            insert_candidate(&new_candidates, CandidateCore::pending_example(&second, &position))
                .await;
        let mut terminal = CandidateCore::pending_example(&first, &position);
        terminal.status = NominationStatus::Withdrawn;
        let withdrawn = insert_candidate(&new_candidates, terminal).await;

        let response = client
            .post(uri!(bulk_scrutinize))
            .header(ContentType::JSON)
            .body(json!([pending_a.id, pending_b.id, withdrawn.id]).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let outcomes: Vec<ScrutinyOutcome> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].approved);
        assert!(outcomes[1].approved);
        assert!(!outcomes[2].approved);
        assert!(outcomes[2].error.as_ref().unwrap().contains("withdrawn"));

        // Each success is audited individually.
        let approvals = audit_entries
            .count_documents(doc! { "action": AuditAction::NominationApproved }, None)
            .await
            .unwrap();
        assert_eq!(approvals, 2);
    }

    #[backend_test]
    async fn plain_voters_may_not_contest(
        client: Client,
        new_voters: Coll<NewVoter>,
        new_positions: Coll<NewPosition>,
        new_schedules: Coll<NewSchedule>,
    ) {
        new_schedules
            .insert_one(ScheduleCore::nominating_example(Track::Hall), None)
            .await
            .unwrap();
        let position = insert_position(&new_positions, PositionCore::hall_secretary_example()).await;
        let proposer = insert_voter(&new_voters, VoterCore::eligible_example2()).await;
        let seconder = insert_voter(&new_voters, VoterCore::hall_commissioner_example()).await;

        // Sign in as a plain (non-candidate-eligible) voter.
        new_voters
            .insert_one(VoterCore::voter_example(), None)
            .await
            .unwrap();
        login_as(&client, &VoterCore::voter_example()).await;

        let response = client
            .post(uri!(submit_nomination))
            .header(ContentType::JSON)
            .body(nomination_body(&position, &proposer, &seconder))
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }
}
