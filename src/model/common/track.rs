use mongodb::bson::{to_bson, Bson};
use rocket::{
    form::{self, prelude::ErrorKind, FromFormField, ValueField},
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, Query, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};

/// The two election tracks that run concurrently: the central students' union
/// election and the per-residence-hall union elections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Central students' union.
    Jucsu,
    /// Residence hall unions.
    Hall,
}

impl Track {
    pub fn as_str(self) -> &'static str {
        match self {
            Track::Jucsu => "jucsu",
            Track::Hall => "hall",
        }
    }

    /// Whether records in this track carry a hall affiliation.
    pub fn is_hall_scoped(self) -> bool {
        matches!(self, Track::Hall)
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Track {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jucsu" => Ok(Track::Jucsu),
            "hall" => Ok(Track::Hall),
            other => Err(format!("Unknown election track '{other}'")),
        }
    }
}

impl From<Track> for Bson {
    fn from(track: Track) -> Self {
        to_bson(&track).expect("Serialisation is infallible")
    }
}

impl<'a> FromParam<'a> for Track {
    type Error = String;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

#[rocket::async_trait]
impl<'r> FromFormField<'r> for Track {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        field
            .value
            .parse::<Track>()
            .map_err(|err| ErrorKind::Validation(err.into()).into())
    }
}

impl UriDisplay<Path> for Track {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> std::fmt::Result {
        formatter.write_value(self.as_str())
    }
}

impl UriDisplay<Query> for Track {
    fn fmt(
        &self,
        formatter: &mut rocket::http::uri::fmt::Formatter<'_, Query>,
    ) -> std::fmt::Result {
        formatter.write_value(self.as_str())
    }
}

impl_from_uri_param_identity!([Path] Track);
impl_from_uri_param_identity!([Query] Track);
