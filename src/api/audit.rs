use chrono::DateTime;
use mongodb::bson::{self, doc, Document};
use mongodb::options::FindOptions;
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::pagination::{Paginated, PaginationRequest},
        auth::{AuthToken, Commissioner},
        db::AuditEntry,
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![query_audit_log]
}

/// `Query`: read the audit log newest-first, filtered and paginated. The
/// log has no mutation surface; this endpoint is the whole read side.
#[get("/audit?<actor>&<collection>&<from>&<to>&<pagination..>")]
pub async fn query_audit_log(
    _token: AuthToken<Commissioner>,
    actor: Option<Id>,
    collection: Option<String>,
    from: Option<String>,
    to: Option<String>,
    pagination: PaginationRequest,
    entries: Coll<AuditEntry>,
) -> Result<Json<Paginated<AuditEntry>>> {
    let mut filter = Document::new();
    if let Some(actor) = actor {
        filter.insert("actor_id", actor);
    }
    if let Some(collection) = collection {
        filter.insert("collection", collection);
    }
    if let Some(range) = date_range(from.as_deref(), to.as_deref())? {
        filter.insert("logged_at", range);
    }

    let newest_first = FindOptions::builder()
        .sort(doc! { "logged_at": -1 })
        .skip(u64::from(pagination.skip()))
        .limit(i64::from(pagination.page_size()))
        .build();

    let page = entries
        .find(filter.clone(), newest_first)
        .await?
        .try_collect::<Vec<_>>()
        .await?;
    let total = entries.count_documents(filter, None).await?;

    Ok(Json(pagination.to_paginated(total, page)))
}

/// Parse the optional RFC 3339 bounds into a BSON range document.
fn date_range(from: Option<&str>, to: Option<&str>) -> Result<Option<Document>> {
    let mut range = Document::new();
    if let Some(from) = from {
        range.insert("$gte", bson::DateTime::from_chrono(parse_bound(from)?));
    }
    if let Some(to) = to {
        range.insert("$lte", bson::DateTime::from_chrono(parse_bound(to)?));
    }
    Ok((!range.is_empty()).then_some(range))
}

fn parse_bound(bound: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    DateTime::parse_from_rfc3339(bound)
        .map(|datetime| datetime.with_timezone(&chrono::Utc))
        .map_err(|err| Error::validation(format!("Invalid RFC 3339 date bound '{bound}': {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::{http::Status, local::asynchronous::Client, serde::json::serde_json};

    use crate::model::{
        common::AuditAction,
        db::{AuditEntryCore, NewAuditEntry},
        mongodb::MongoCollection,
    };

    use super::*;

    async fn insert_entries(new_entries: &Coll<NewAuditEntry>) -> Vec<Id> {
        let mut actor_ids = Vec::new();
        for (offset, (action, collection)) in [
            (AuditAction::VoterRegistered, "voters"),
            (AuditAction::NominationSubmitted, "candidates"),
            (AuditAction::VoteCast, "ballots"),
        ]
        .into_iter()
        .enumerate()
        {
            let actor_id = Id::new();
            let entry = AuditEntryCore {
                actor_id,
                action,
                collection: collection.to_string(),
                record_id: Id::new(),
                before: None,
                after: None,
                logged_at: Utc::now() - chrono::Duration::minutes(10 - offset as i64),
            };
            new_entries.insert_one(entry, None).await.unwrap();
            actor_ids.push(actor_id);
        }
        actor_ids
    }

    #[backend_test(admin)]
    async fn audit_log_reads_newest_first(client: Client, new_entries: Coll<NewAuditEntry>) {
        insert_entries(&new_entries).await;

        let response = client.get("/audit").dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let page: Paginated<AuditEntry> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        // The admin login itself isn't audited, so only our three entries.
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.items[0].action, AuditAction::VoteCast);
        assert_eq!(page.items[2].action, AuditAction::VoterRegistered);
    }

    #[backend_test(admin)]
    async fn audit_log_filters_by_collection_and_actor(
        client: Client,
        new_entries: Coll<NewAuditEntry>,
    ) {
        let actor_ids = insert_entries(&new_entries).await;

        let response = client.get("/audit?collection=ballots").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let page: Paginated<AuditEntry> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].collection, crate::model::db::Ballot::NAME);

        let response = client
            .get(format!("/audit?actor={}", actor_ids[0]))
            .dispatch()
            .await;
        let page: Paginated<AuditEntry> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].action, AuditAction::VoterRegistered);
    }

    #[backend_test(admin)]
    async fn audit_log_rejects_bad_date_bounds(client: Client) {
        let response = client.get("/audit?from=yesterday").dispatch().await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test(admin)]
    async fn audit_log_pages(client: Client, new_entries: Coll<NewAuditEntry>) {
        insert_entries(&new_entries).await;

        let response = client
            .get("/audit?page_num=2&page_size=2")
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let page: Paginated<AuditEntry> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.items.len(), 1);
    }
}
