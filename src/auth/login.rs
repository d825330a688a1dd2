use axum::{debug_handler, response::{IntoResponse, Response}, Form, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{identity, session::EMAIL, AppResult};

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    pub(crate) email: String,
}

#[debug_handler]
pub(crate) async fn login(
    session: Session,
    Form(LoginForm { email }): Form<LoginForm>,
) -> AppResult<Response> {
    if email.is_empty() {
        return Err("login without an email")?;
    }

    let uuid = identity::derive_id(&email);
    session.insert(EMAIL, &email).await?;
    tracing::info!(%uuid, %email, "logged in");

    Ok(Json(serde_json::json!({ "success": true, "uuid": uuid })).into_response())
}
