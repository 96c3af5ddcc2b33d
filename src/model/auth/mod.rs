//! Per-request actor context.
//!
//! The JWT cookie only ever carries the account ID and a role hint; the
//! request guard reloads the account from the store and takes role, hall,
//! and activity from the record, so a stale or tampered claim can never
//! widen an actor's scope.

use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{
    common::{HallName, Role, Track},
    db::voter::Voter,
    mongodb::{Coll, Id},
};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// A compile-time bound on which roles a route admits.
pub trait ActorScope {
    fn permits(role: Role) -> bool;
}

/// Any signed-in account.
pub struct AnyActor;

/// Hall or central commissioner.
pub struct Commissioner;

/// Central commissioner only.
pub struct CentralCommissioner;

impl ActorScope for AnyActor {
    fn permits(_role: Role) -> bool {
        true
    }
}

impl ActorScope for Commissioner {
    fn permits(role: Role) -> bool {
        role.is_commissioner()
    }
}

impl ActorScope for CentralCommissioner {
    fn permits(role: Role) -> bool {
        role == Role::CentralCommissioner
    }
}

/// The authenticated actor for this request, scoped to `S`.
pub struct AuthToken<S> {
    pub id: Id,
    pub role: Role,
    pub hall: HallName,
    phantom: PhantomData<S>,
}

impl AuthToken<AnyActor> {
    /// Build a token for a freshly authenticated account.
    pub fn new(voter: &Voter) -> Self {
        Self {
            id: voter.id,
            role: voter.role,
            hall: voter.hall.clone(),
            phantom: PhantomData,
        }
    }
}

impl<S> AuthToken<S> {
    /// May this actor scrutinize or administer a record in `track` with the
    /// given hall affiliation? The hall is always taken from the target
    /// record, never from the caller's claims.
    pub fn has_scope_over(&self, track: Track, hall: Option<&HallName>) -> bool {
        match self.role {
            Role::CentralCommissioner => true,
            Role::HallCommissioner => track.is_hall_scoped() && hall == Some(&self.hall),
            _ => false,
        }
    }

    /// Serialise this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            sub: self.id,
            role: self.role,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }
}

/// Raw cookie claims.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: Id,
    #[serde(rename = "rol")]
    role: Role,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

impl Claims {
    fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, Error> {
        let claims = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Claims>| data.claims)?;
        Ok(claims)
    }
}

#[rocket::async_trait]
impl<'r, S> FromRequest<'r> for AuthToken<S>
where
    S: ActorScope + Send,
{
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        // Forward to any routes that do not require authentication.
        let cookie = try_outcome!(req.cookies().get(AUTH_TOKEN_COOKIE).or_forward(()));
        let claims = try_outcome!(Claims::from_cookie(cookie, config).or_forward(()));

        // Cheap pre-check on the claimed role before touching the store.
        if !S::permits(claims.role) {
            return Outcome::Forward(());
        }

        // The stored record is authoritative for role, hall, and activity.
        let db = req.guard::<&State<mongodb::Database>>().await.unwrap();
        match Coll::<Voter>::from_db(db).find_one(claims.sub.as_doc(), None).await {
            Ok(Some(voter)) if voter.active && S::permits(voter.role) => {
                Outcome::Success(AuthToken {
                    id: voter.id,
                    role: voter.role,
                    hall: voter.hall.clone(),
                    phantom: PhantomData,
                })
            }
            Ok(_) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}
