use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::common::NominationStatus;

pub type Result<T> = std::result::Result<T, Error>;

/// The closed error taxonomy.
///
/// Business-rule failures are returned to the caller as typed results with a
/// specific reason, never as bare faults. Only [`Error::TransientStorage`]
/// is ever worth retrying; the conflict-class errors (`DuplicateNomination`,
/// `AlreadyVoted`, `InvalidStateTransition`) report a settled outcome and
/// must not be retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("{0}")]
    PhaseClosed(String),
    #[error("{0}")]
    DuplicateNomination(String),
    #[error("{0}")]
    AlreadyVoted(String),
    #[error("Nomination is {from}; it cannot become {to}")]
    InvalidStateTransition {
        from: NominationStatus,
        to: NominationStatus,
    },
    #[error("Not permitted: {0}")]
    Authorization(String),
    #[error("{0}")]
    NotEligible(String),
    #[error("{0}")]
    InvalidCandidate(String),
    #[error("{0}")]
    ReferenceIntegrity(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Temporary storage conflict, safe to retry: {0}")]
    TransientStorage(String),
}

impl Error {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn phase_closed(reason: impl Into<String>) -> Self {
        Self::PhaseClosed(reason.into())
    }

    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization(reason.into())
    }

    pub fn reference(reason: impl Into<String>) -> Self {
        Self::ReferenceIntegrity(reason.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Jwt(_) => Status::InternalServerError,
            Self::Validation(_) | Self::InvalidCandidate(_) | Self::ReferenceIntegrity(_) => {
                Status::UnprocessableEntity
            }
            Self::PhaseClosed(_) | Self::Authorization(_) | Self::NotEligible(_) => {
                Status::Forbidden
            }
            Self::DuplicateNomination(_)
            | Self::AlreadyVoted(_)
            | Self::InvalidStateTransition { .. } => Status::Conflict,
            Self::NotFound(_) => Status::NotFound,
            Self::TransientStorage(_) => Status::ServiceUnavailable,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {} failed: {self}", req.method(), req.uri());
            // Internal details stay in the log.
            return Err(status);
        }
        warn!("{} {} rejected: {self}", req.method(), req.uri());
        // Rejected mutations carry their specific reason to the caller.
        let reason = self.to_string();
        rocket::Response::build_from(reason.respond_to(req)?)
            .status(status)
            .ok()
    }
}
