use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Document};
use mongodb::ClientSession;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{common::AuditAction, mongodb::{Coll, Id}};

/// One immutable audit record. Entries are only ever inserted — there is no
/// update or delete surface anywhere in the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntryCore {
    /// The account that performed the action.
    pub actor_id: Id,
    pub action: AuditAction,
    /// The collection the affected record lives in.
    pub collection: String,
    pub record_id: Id,
    /// Snapshot of the record before the mutation, absent for creations.
    pub before: Option<Document>,
    /// Snapshot after the mutation, absent for pure marker updates.
    pub after: Option<Document>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub logged_at: DateTime<Utc>,
}

/// An audit entry ready for DB insertion is just an entry without an ID.
pub type NewAuditEntry = AuditEntryCore;

/// An audit entry from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub entry: AuditEntryCore,
}

impl Deref for AuditEntry {
    type Target = AuditEntryCore;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

/// Append an entry inside the caller's transaction.
///
/// Because the insert shares the session of the business mutation it
/// records, an audit failure aborts the whole transaction: no mutation can
/// commit unaudited.
#[allow(clippy::too_many_arguments)]
pub async fn record(
    entries: &Coll<NewAuditEntry>,
    session: &mut ClientSession,
    actor_id: Id,
    action: AuditAction,
    collection: &'static str,
    record_id: Id,
    before: Option<Document>,
    after: Option<Document>,
) -> Result<()> {
    let entry = AuditEntryCore {
        actor_id,
        action,
        collection: collection.to_string(),
        record_id,
        before,
        after,
        logged_at: Utc::now(),
    };
    entries
        .insert_one_with_session(entry, None, session)
        .await?;
    Ok(())
}
