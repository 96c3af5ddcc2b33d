use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::{
    common::NominationStatus,
    db::{
        audit::{AuditEntry, NewAuditEntry},
        ballot::{Ballot, NewBallot},
        candidate::{Candidate, NewCandidate},
        position::{NewPosition, Position},
        schedule::{NewSchedule, Schedule},
        voter::{NewVoter, Voter},
    },
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `derive(Clone)` would require `T: Clone`, which we don't need.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a
    /// collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Voter collection.
const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}
impl MongoCollection for NewVoter {
    const NAME: &'static str = VOTERS;
}

// Position collection.
const POSITIONS: &str = "positions";
impl MongoCollection for Position {
    const NAME: &'static str = POSITIONS;
}
impl MongoCollection for NewPosition {
    const NAME: &'static str = POSITIONS;
}

// Candidate (nomination) collection.
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for NewCandidate {
    const NAME: &'static str = CANDIDATES;
}

// Ballot collection.
const BALLOTS: &str = "ballots";
impl MongoCollection for Ballot {
    const NAME: &'static str = BALLOTS;
}
impl MongoCollection for NewBallot {
    const NAME: &'static str = BALLOTS;
}

// Schedule collection.
const SCHEDULES: &str = "schedules";
impl MongoCollection for Schedule {
    const NAME: &'static str = SCHEDULES;
}
impl MongoCollection for NewSchedule {
    const NAME: &'static str = SCHEDULES;
}

// Audit log collection.
const AUDIT_LOG: &str = "audit_log";
impl MongoCollection for AuditEntry {
    const NAME: &'static str = AUDIT_LOG;
}
impl MongoCollection for NewAuditEntry {
    const NAME: &'static str = AUDIT_LOG;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The unique indexes are load-bearing: ballot one-per-(voter, position,
/// track) uniqueness, one active nomination per (applicant, track), one
/// active schedule per track, and voter identity uniqueness are all enforced
/// here rather than in application logic, so concurrent double-submissions
/// lose deterministically.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Voter collection: identity uniqueness.
    let voters = Coll::<Voter>::from_db(db);
    let reg_no_index = IndexModel::builder()
        .keys(doc! { "reg_no": 1 })
        .options(unique.clone())
        .build();
    voters.create_index(reg_no_index, None).await?;
    let email_index = IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(unique.clone())
        .build();
    voters.create_index(email_index, None).await?;

    // Candidate collection: at most one active nomination per applicant per
    // track. Terminal nominations (rejected/withdrawn) don't count.
    let active_nomination = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {
            "status": { "$in": [NominationStatus::Pending, NominationStatus::Approved] },
        })
        .build();
    let candidate_index = IndexModel::builder()
        .keys(doc! { "voter_id": 1, "track": 1 })
        .options(active_nomination)
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Ballot collection: one ballot per voter per position per track.
    let ballot_index = IndexModel::builder()
        .keys(doc! { "voter_id": 1, "position_id": 1, "track": 1 })
        .options(unique)
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    // Schedule collection: at most one active schedule per track.
    let active_schedule = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! { "active": true })
        .build();
    let schedule_index = IndexModel::builder()
        .keys(doc! { "track": 1 })
        .options(active_schedule)
        .build();
    Coll::<Schedule>::from_db(db)
        .create_index(schedule_index, None)
        .await?;

    // Audit log: newest-first queries.
    let audit_index = IndexModel::builder()
        .keys(doc! { "logged_at": -1 })
        .build();
    Coll::<AuditEntry>::from_db(db)
        .create_index(audit_index, None)
        .await?;

    Ok(())
}
