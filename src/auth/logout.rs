use std::sync::Arc;

use axum::{debug_handler, extract::State, response::Redirect};
use tokio::sync::Mutex;
use tower_sessions::Session;

use crate::{identity, matcher::Matcher, session::EMAIL, AppResult};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn logout(
    State(matcher): State<Arc<Mutex<Matcher>>>,
    session: Session,
) -> AppResult<Redirect> {
    if let Some(email) = session.get::<String>(EMAIL).await? {
        // Tear down the session's notification slots along with the cookie.
        matcher.lock().await.unsubscribe_all(identity::derive_id(&email));
    }
    session.clear().await;
    Ok(Redirect::to("/"))
}
