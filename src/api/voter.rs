use mongodb::bson::{doc, to_document};
use mongodb::Client;
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::voter::RegistrationRequest,
        auth::{AuthToken, Commissioner},
        common::{AuditAction, Role},
        db::{
            audit,
            voter::{NewVoter, Voter, VoterCore},
            NewAuditEntry,
        },
        mongodb::{errors::is_duplicate_key_error, transaction, Coll, Id, MongoCollection},
    },
};

pub fn routes() -> Vec<Route> {
    routes![register, verify_voter, reject_voter]
}

/// Self-service registration. The account starts active but unverified; it
/// cannot vote until the responsible commissioner has verified it.
#[post("/voters", data = "<registration>", format = "json")]
pub async fn register(
    registration: Json<RegistrationRequest>,
    new_voters: Coll<NewVoter>,
    audit_entries: Coll<NewAuditEntry>,
    db_client: &State<Client>,
) -> Result<Json<Id>> {
    registration.validate()?;

    let voter = VoterCore::new(
        registration.reg_no.clone(),
        registration.email.clone(),
        registration.name.clone(),
        &registration.password,
        registration.role(),
        registration.hall.clone(),
        registration.department.clone(),
    );

    let mut session = transaction::start(db_client).await?;
    let result = async {
        let new_id: Id = new_voters
            .insert_one_with_session(&voter, None, &mut session)
            .await
            .map_err(|err| {
                if is_duplicate_key_error(&err) {
                    Error::validation("Registration number or email is already registered")
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
            new_id,
            AuditAction::VoterRegistered,
            Voter::NAME,
            new_id,
            None,
            Some(audit_snapshot(&voter)),
        )
        .await?;

        Ok(new_id)
    }
    .await;

    match result {
        Ok(new_id) => {
            transaction::commit(&mut session).await?;
            info!("Registered voter {new_id}");
            Ok(Json(new_id))
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

/// Mark a registration as verified. Hall commissioners may only verify
/// voters of their own hall; the scope is re-checked against the stored
/// record, not the caller's claims.
#[post("/voters/<voter_id>/verify")]
pub async fn verify_voter(
    token: AuthToken<Commissioner>,
    voter_id: Id,
    voters: Coll<Voter>,
    audit_entries: Coll<NewAuditEntry>,
    db_client: &State<Client>,
) -> Result<()> {
    set_voter_flag(
        &token,
        voter_id,
        &voters,
        &audit_entries,
        db_client,
        doc! { "$set": { "verified": true } },
        AuditAction::VoterVerified,
    )
    .await
}

/// Reject a registration: the account is deactivated, never deleted.
#[post("/voters/<voter_id>/reject")]
pub async fn reject_voter(
    token: AuthToken<Commissioner>,
    voter_id: Id,
    voters: Coll<Voter>,
    audit_entries: Coll<NewAuditEntry>,
    db_client: &State<Client>,
) -> Result<()> {
    set_voter_flag(
        &token,
        voter_id,
        &voters,
        &audit_entries,
        db_client,
        doc! { "$set": { "active": false, "verified": false } },
        AuditAction::VoterRejected,
    )
    .await
}

async fn set_voter_flag(
    token: &AuthToken<Commissioner>,
    voter_id: Id,
    voters: &Coll<Voter>,
    audit_entries: &Coll<NewAuditEntry>,
    db_client: &Client,
    update: mongodb::bson::Document,
    action: AuditAction,
) -> Result<()> {
    let mut session = transaction::start(db_client).await?;
    let result = async {
        let target = voters
            .find_one_with_session(voter_id.as_doc(), None, &mut session)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;

        // The authorization boundary: a hall commissioner's authority only
        // covers their own hall.
        if token.role == Role::HallCommissioner && target.hall != token.hall {
            return Err(Error::authorization(format!(
                "Voter {voter_id} belongs to {}, not to the commissioner's hall",
                target.hall
            )));
        }

        let update_result = voters
            .update_one_with_session(voter_id.as_doc(), update, None, &mut session)
            .await?;
        if update_result.modified_count == 0 {
            // Already in the requested state; nothing to audit.
            return Ok(false);
        }

        let after = voters
            .find_one_with_session(voter_id.as_doc(), None, &mut session)
            .await?
            .unwrap(); // Present: we just updated it.

        audit::record(
            audit_entries,
            &mut session,
            token.id,
            action,
            Voter::NAME,
            voter_id,
            Some(audit_snapshot(&target.voter)),
            Some(audit_snapshot(&after.voter)),
        )
        .await?;

        Ok(true)
    }
    .await;

    match result {
        Ok(_) => {
            transaction::commit(&mut session).await?;
            Ok(())
        }
        Err(err) => {
            transaction::abort(&mut session).await;
            Err(err)
        }
    }
}

/// Snapshot a voter for the audit log, minus the password hash.
fn audit_snapshot(voter: &VoterCore) -> mongodb::bson::Document {
    let mut doc = to_document(voter).expect("Serialisation is infallible");
    doc.remove("password_hash");
    doc
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::db::{
        voter::{EXAMPLE_HALL, OTHER_HALL},
        AuditEntry,
    };

    use super::*;

    fn registration() -> RegistrationRequest {
        RegistrationRequest {
            reg_no: "2022-19-8001".to_string(),
            email: "fresh@ju.example".to_string(),
            name: "Fresh Registrant".to_string(),
            password: "a long enough password".to_string(),
            hall: EXAMPLE_HALL.to_string(),
            department: "Mathematics".to_string(),
            seeking_candidacy: false,
        }
    }

    #[backend_test]
    async fn register_creates_unverified_account(
        client: Client,
        voters: Coll<Voter>,
        audit_entries: Coll<AuditEntry>,
    ) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(registration()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let voter = voters
            .find_one(doc! { "reg_no": &registration().reg_no }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(!voter.verified);
        assert!(voter.active);
        assert_eq!(voter.role, Role::Voter);

        // The registration is audited, with no password material.
        let entry = audit_entries
            .find_one(doc! { "action": AuditAction::VoterRegistered }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.record_id, voter.id);
        assert!(!entry
            .after
            .as_ref()
            .unwrap()
            .contains_key("password_hash"));
    }

    #[backend_test]
    async fn register_rejects_duplicate_reg_no(client: Client) {
        let first = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(registration()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, first.status());

        let mut duplicate = registration();
        duplicate.email = "different@ju.example".to_string();
        let second = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(duplicate).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, second.status());
    }

    #[backend_test(hall)]
    async fn hall_commissioner_verifies_own_hall(
        client: Client,
        voters: Coll<Voter>,
        new_voters: Coll<NewVoter>,
    ) {
        let new_id = new_voters
            .insert_one(VoterCore::unverified_example(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap();

        let response = client
            .post(format!("/voters/{}/verify", new_id.to_hex()))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let voter = voters
            .find_one(doc! { "_id": new_id }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(voter.verified);
    }

    #[backend_test(hall)]
    async fn hall_commissioner_cannot_touch_other_hall(
        client: Client,
        new_voters: Coll<NewVoter>,
    ) {
        let mut outsider = VoterCore::unverified_example();
        outsider.hall = OTHER_HALL.to_string();
        let new_id = new_voters
            .insert_one(outsider, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap();

        let response = client
            .post(format!("/voters/{}/verify", new_id.to_hex()))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn rejection_deactivates_but_keeps_the_record(
        client: Client,
        voters: Coll<Voter>,
        new_voters: Coll<NewVoter>,
    ) {
        let new_id = new_voters
            .insert_one(VoterCore::unverified_example(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap();

        let response = client
            .post(format!("/voters/{}/reject", new_id.to_hex()))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // Soft-disabled, not deleted.
        let voter = voters
            .find_one(doc! { "_id": new_id }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(!voter.active);
        assert!(!voter.verified);
    }
}
