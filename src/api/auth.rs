use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::auth::LoginRequest,
        auth::{AuthToken, AUTH_TOKEN_COOKIE},
        db::Voter,
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![login, logout]
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<LoginRequest>,
    voters: Coll<Voter>,
    config: &State<Config>,
) -> Result<()> {
    let with_reg_no = doc! {
        "reg_no": &credentials.reg_no,
    };

    let voter = voters
        .find_one(with_reg_no, None)
        .await?
        .filter(|voter| voter.active && voter.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::authorization(
                "No active account matches the provided registration number and password.",
            )
        })?;

    let token = AuthToken::new(&voter);
    cookies.add(token.into_cookie(config));

    Ok(())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}
