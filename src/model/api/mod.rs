//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way (RFC 3339
//! datetimes, JSON-native numbers), unlike their BSON-oriented counterparts
//! in [`crate::model::db`].

pub mod admin;
pub mod auth;
pub mod nomination;
pub mod pagination;
pub mod results;
pub mod voter;
pub mod voting;
