use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{common::Track, mongodb::Id};

/// A contested position, e.g. "President" on the central track or "Hall
/// Secretary" on the hall track. Hall-track positions are shared by every
/// hall; the candidates carry the hall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCore {
    pub name: String,
    pub track: Track,
    /// Display order on ballots and result pages.
    pub order: u32,
    /// Inactive positions accept neither nominations nor ballots.
    pub active: bool,
}

impl PositionCore {
    pub fn new(name: String, track: Track, order: u32) -> Self {
        Self {
            name,
            track,
            order,
            active: true,
        }
    }
}

/// A position ready for DB insertion is just a position without an ID.
pub type NewPosition = PositionCore;

/// A position from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub position: PositionCore,
}

impl Deref for Position {
    type Target = PositionCore;

    fn deref(&self) -> &Self::Target {
        &self.position
    }
}

impl DerefMut for Position {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.position
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl PositionCore {
        pub fn president_example() -> Self {
            Self::new("President".to_string(), Track::Jucsu, 1)
        }

        pub fn hall_secretary_example() -> Self {
            Self::new("Hall Secretary".to_string(), Track::Hall, 1)
        }
    }
}
