use rocket::Route;

pub mod admin;
pub mod audit;
pub mod auth;
pub mod nomination;
pub mod results;
pub mod voter;
pub mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.append(&mut auth::routes());
    routes.append(&mut voter::routes());
    routes.append(&mut admin::routes());
    routes.append(&mut nomination::routes());
    routes.append(&mut voting::routes());
    routes.append(&mut results::routes());
    routes.append(&mut audit::routes());
    routes
}
