use std::ops::{Deref, DerefMut};

use mongodb::bson::doc;
use mongodb::error::Error as DbError;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{HallName, Role, Track},
    mongodb::{Coll, Id},
};

/// Per-track "has completed voting" flags, set once a voter holds a ballot
/// for every active position in the track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotedFlags {
    pub jucsu: bool,
    pub hall: bool,
}

impl VotedFlags {
    pub fn for_track(&self, track: Track) -> bool {
        match track {
            Track::Jucsu => self.jucsu,
            Track::Hall => self.hall,
        }
    }

    /// Dotted field path for targeted `$set` updates.
    pub fn field_name(track: Track) -> &'static str {
        match track {
            Track::Jucsu => "voted.jucsu",
            Track::Hall => "voted.hall",
        }
    }
}

/// Core voter account data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// University registration number; unique.
    pub reg_no: String,
    /// Unique contact address.
    pub email: String,
    /// Display name; also the candidate name on any nomination.
    pub name: String,
    /// Argon2-encoded password hash.
    pub password_hash: String,
    pub role: Role,
    /// Residence hall affiliation.
    pub hall: HallName,
    pub department: String,
    /// Flipped by the responsible commissioner; must be true to vote.
    pub verified: bool,
    /// False once rejected or deactivated. Accounts are never hard-deleted.
    pub active: bool,
    pub voted: VotedFlags,
}

impl VoterCore {
    pub fn new(
        reg_no: String,
        email: String,
        name: String,
        password: &str,
        role: Role,
        hall: HallName,
        department: String,
    ) -> Self {
        Self {
            reg_no,
            email,
            name,
            password_hash: hash_password(password),
            role,
            hall,
            department,
            verified: false,
            active: true,
            voted: VotedFlags::default(),
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_bytes()).unwrap_or(false)
    }

    /// Verified, active accounts are the electorate.
    pub fn is_eligible_to_vote(&self) -> bool {
        self.verified && self.active
    }
}

/// Encode a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = rand::thread_rng().gen::<[u8; 16]>();
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
        .expect("Default argon2 config is valid")
}

/// A voter ready for DB insertion is just a voter without an ID.
pub type NewVoter = VoterCore;

/// A voter account from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

pub const DEFAULT_COMMISSIONER_REG_NO: &str = "JUCSU-ADMIN";
const DEFAULT_COMMISSIONER_PASSWORD: &str = "insecure-default-password";

/// Seed the default central commissioner account if no account holds the
/// reserved registration number yet. Idempotent.
pub async fn ensure_commissioner_exists(voters: &Coll<NewVoter>) -> Result<(), DbError> {
    let existing = voters
        .find_one(doc! { "reg_no": DEFAULT_COMMISSIONER_REG_NO }, None)
        .await?;
    if existing.is_none() {
        warn!("Seeding default central commissioner; change its password immediately");
        let mut commissioner = VoterCore::new(
            DEFAULT_COMMISSIONER_REG_NO.to_string(),
            "elections@ju.example".to_string(),
            "Election Commission".to_string(),
            DEFAULT_COMMISSIONER_PASSWORD,
            Role::CentralCommissioner,
            "Central Office".to_string(),
            "Election Commission".to_string(),
        );
        commissioner.verified = true;
        voters.insert_one(commissioner, None).await?;
    }
    Ok(())
}


#[cfg(test)]
pub use examples::{EXAMPLE_HALL, EXAMPLE_PASSWORD, OTHER_HALL};
