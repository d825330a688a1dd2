//! Session login. Callers are trusted to supply their own contact email;
//! there is no verification step, the session just remembers who is talking.

mod login;
mod logout;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login::login))
        .route("/logout", get(logout::logout))
}
