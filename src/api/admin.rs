use mongodb::bson::{doc, to_document};
use mongodb::{options::FindOptions, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::admin::{PositionSpec, ScheduleSpec},
        auth::{AuthToken, CentralCommissioner},
        common::{AuditAction, ElectionPhase, Track},
        db::{
            audit, NewAuditEntry, NewPosition, NewSchedule, Position, Schedule, ScheduleCore,
        },
        mongodb::{errors::is_duplicate_key_error, transaction, Coll, Id, MongoCollection},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_positions,
        create_position,
        modify_position,
        create_schedule,
        advance_phase,
    ]
}

/// Publicly list the positions of a track, in display order.
#[get("/positions?<track>")]
pub async fn list_positions(track: Track, positions: Coll<Position>) -> Result<Json<Vec<Position>>> {
    let order = FindOptions::builder().sort(doc! { "order": 1 }).build();
    let listing = positions
        .find(doc! { "track": track }, order)
        .await?
        .try_collect()
        .await?;
    Ok(Json(listing))
}

#[post("/positions", data = "<spec>", format = "json")]
pub async fn create_position(
    token: AuthToken<CentralCommissioner>,
    spec: Json<PositionSpec>,
    new_positions: Coll<NewPosition>,
    schedules: Coll<Schedule>,
    audit_entries: Coll<NewAuditEntry>,
    db_client: &State<Client>,
) -> Result<Json<Id>> {
    if spec.name.trim().is_empty() {
        return Err(Error::validation("Position name must not be empty"));
    }
    refuse_once_voting_started(&schedules, spec.track).await?;

    let position: NewPosition = spec.0.into();
    let mut session = transaction::start(db_client).await?;
    let result = async {
        let new_id: Id = new_positions
            .insert_one_with_session(&position, None, &mut session)
            .await?
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB.
            .into();

        audit::record(
            &audit_entries,
            &mut session,
            token.id,
            AuditAction::PositionCreated,
            Position::NAME,
            new_id,
            None,
            Some(to_document(&position).expect("Serialisation is infallible")),
        )
        .await?;

        Ok(new_id)
    }
    .await;

    match result {
        Ok(new_id) => {
            transaction::commit(&mut session).await?;
            Ok(Json(new_id))
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

/// Replace a position's definition. Refused once voting has started for its
/// track; the position set is structurally frozen mid-election.
#[put("/positions/<position_id>", data = "<spec>", format = "json")]
pub async fn modify_position(
    token: AuthToken<CentralCommissioner>,
    position_id: Id,
    spec: Json<PositionSpec>,
    positions: Coll<Position>,
    schedules: Coll<Schedule>,
    audit_entries: Coll<NewAuditEntry>,
    db_client: &State<Client>,
) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(Error::validation("Position name must not be empty"));
    }

    let mut session = transaction::start(db_client).await?;
    let result = async {
        let existing = positions
            .find_one_with_session(position_id.as_doc(), None, &mut session)
            .await?
            .ok_or_else(|| Error::not_found(format!("Position {position_id}")))?;

        // Gate on both the old and the new track; a position cannot be
        // moved into or out of a track whose voting has begun.
        refuse_once_voting_started(&schedules, existing.track).await?;
        if spec.track != existing.track {
            refuse_once_voting_started(&schedules, spec.track).await?;
        }

        let replacement: NewPosition = spec.0.clone().into();
        let update = doc! {
            "$set": to_document(&replacement).expect("Serialisation is infallible"),
        };
        positions
            .update_one_with_session(position_id.as_doc(), update, None, &mut session)
            .await?;

        audit::record(
            &audit_entries,
            &mut session,
            token.id,
            AuditAction::PositionModified,
            Position::NAME,
            position_id,
            Some(to_document(&existing.position).expect("Serialisation is infallible")),
            Some(to_document(&replacement).expect("Serialisation is infallible")),
        )
        .await?;

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

/// Create the schedule for a track. Any previously active schedule for the
/// track is deactivated (never deleted) in the same transaction.
#[post("/schedules", data = "<spec>", format = "json")]
pub async fn create_schedule(
    token: AuthToken<CentralCommissioner>,
    spec: Json<ScheduleSpec>,
    schedules: Coll<Schedule>,
    new_schedules: Coll<NewSchedule>,
    audit_entries: Coll<NewAuditEntry>,
    db_client: &State<Client>,
) -> Result<Json<Id>> {
    let schedule: ScheduleCore = spec.0.into();
    schedule.validate()?;

    let mut session = transaction::start(db_client).await?;
    let result = async {
        // Supersede, don't delete.
        schedules
            .update_many_with_session(
                doc! { "track": schedule.track, "active": true },
                doc! { "$set": { "active": false } },
                None,
                &mut session,
            )
            .await?;

        let new_id: Id = new_schedules
            .insert_one_with_session(&schedule, None, &mut session)
            .await
            .map_err(|err| {
                if is_duplicate_key_error(&err) {
                    Error::validation("Another active schedule was created concurrently")
                } else {
                    err.into()
                }
            })?
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB.
            .into();

        audit::record(
            &audit_entries,
            &mut session,
            token.id,
            AuditAction::ScheduleCreated,
            Schedule::NAME,
            new_id,
            None,
            Some(to_document(&schedule).expect("Serialisation is infallible")),
        )
        .await?;

        Ok(new_id)
    }
    .await;

    match result {
        Ok(new_id) => {
            transaction::commit(&mut session).await?;
            info!("New {} schedule {new_id} is active", schedule.track);
            Ok(Json(new_id))
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

/// Advance the track's phase marker one step. Declaring results (the step to
/// `Completed`) has its own endpoint and is not reachable from here.
#[post("/schedules/<track>/advance")]
pub async fn advance_phase(
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

        let next = match schedule.phase.next() {
            Some(ElectionPhase::Completed) | None => {
                return Err(Error::validation(format!(
                    "The {} phase cannot be advanced from here; results are declared via the \
                     declaration endpoint",
                    schedule.phase
                )));
            }
            Some(next) => next,
        };

        let update_result = schedules
            .update_one_with_session(
                doc! { "_id": schedule.id, "phase": schedule.phase },
                doc! { "$set": { "phase": next } },
                None,
                &mut session,
            )
            .await?;
        assert_eq!(update_result.modified_count, 1);

        audit::record(
            &audit_entries,
            &mut session,
            token.id,
            AuditAction::PhaseAdvanced,
            Schedule::NAME,
            schedule.id,
            Some(doc! { "phase": schedule.phase }),
            Some(doc! { "phase": next }),
        )
        .await?;

        info!("{track} track advanced from {} to {next}", schedule.phase);
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

/// Positions are immutable once their track's voting has started.
async fn refuse_once_voting_started(schedules: &Coll<Schedule>, track: Track) -> Result<()> {
    let schedule = schedules
        .find_one(doc! { "track": track, "active": true }, None)
        .await?;
    if let Some(schedule) = schedule {
        if matches!(
            schedule.phase,
            ElectionPhase::Voting | ElectionPhase::Completed
        ) {
            return Err(Error::phase_closed(format!(
                "The {track} track has started voting; positions can no longer change"
            )));
        }
    }
    Ok(())
}
