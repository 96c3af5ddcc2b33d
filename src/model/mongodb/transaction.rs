//! Transaction plumbing shared by every check-then-write operation.
//!
//! All multi-document invariants (ballot uniqueness, nomination status
//! transitions, counter increments, audit coupling) are enforced inside a
//! single session transaction. Transient serialization conflicts are retried
//! here with bounded, jittered backoff; business-rule failures are surfaced
//! immediately and never retried.

use mongodb::error::{
    Error as DbError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use mongodb::{Client, ClientSession};
use rand::Rng;
use rocket::tokio::time::{sleep, Duration};

use crate::error::{Error, Result};

/// Maximum times a transaction is attempted before the transient error is
/// surfaced to the caller as retryable.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// Start a session with a fresh transaction on it.
pub async fn start(client: &Client) -> Result<ClientSession> {
    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;
    Ok(session)
}

/// Commit, retrying while the commit outcome is unknown.
pub async fn commit(session: &mut ClientSession) -> Result<()> {
    loop {
        match session.commit_transaction().await {
            Ok(()) => return Ok(()),
            Err(err) if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {
                warn!("Unknown transaction commit result, retrying commit");
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Abort without masking the error that got us here.
pub async fn abort(session: &mut ClientSession) {
    if let Err(err) = session.abort_transaction().await {
        warn!("Failed to abort transaction: {err}");
    }
}

/// Whether the whole transaction should be re-run from the top.
pub fn is_transient(err: &Error) -> bool {
    match err {
        Error::Db(db_err) => is_transient_db(db_err),
        _ => false,
    }
}

fn is_transient_db(err: &DbError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}

/// Sleep before the next attempt: exponential base with uniform jitter.
pub async fn backoff(attempt: u32) {
    let base = 25u64 << attempt.min(6);
    let jitter = rand::thread_rng().gen_range(0..base);
    sleep(Duration::from_millis(base + jitter)).await;
}

/// Convert an error that exhausted its attempts into the caller-facing
/// retryable form.
pub fn into_exhausted(err: Error) -> Error {
    match err {
        Error::Db(db_err) if is_transient_db(&db_err) => Error::TransientStorage(format!(
            "storage contention was not resolved after {MAX_TRANSACTION_ATTEMPTS} attempts: {db_err}"
        )),
        other => other,
    }
}
