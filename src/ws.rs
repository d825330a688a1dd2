//! The websocket transport: one socket per logged-in session, carrying
//! tagged JSON action frames in and `updateUserData` pushes out.
//!
//! Connecting subscribes the session to every event kind for its user, which
//! displaces whatever handlers a previous connection registered; delivery
//! always follows the most recent socket.

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_sessions::Session;
use tracing::debug;
use uuid::Uuid;

use crate::matcher::{EventKind, EventPayload, Matcher, Profile};
use crate::{identity, session::EMAIL, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(user_ws))
}

/// One frame per action of the protocol. Every frame names its course and
/// group; a single socket serves all of a user's groups.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ClientFrame {
    JoinGroup {
        course: String,
        group: String,
        name: String,
        timezone: String,
        #[serde(default)]
        bio: String,
        #[serde(default)]
        pitch: String,
        on_match_message: Option<String>,
    },
    GetData { course: String, group: String },
    Swipe { course: String, group: String, uuid: Uuid, right_swipe: bool },
    AcceptMatch { course: String, group: String, uuid: Uuid },
    RejectMatch { course: String, group: String, uuid: Uuid },
    Chat { course: String, group: String, uuid: Uuid, message: String },
    RefreshQueue { course: String, group: String },
}

#[derive(Serialize)]
struct Ack<'a> {
    event: &'static str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    course: &'a str,
    group: &'a str,
}

#[derive(Serialize)]
struct Push<'a> {
    event: &'static str,
    success: bool,
    #[serde(flatten)]
    data: &'a EventPayload,
}

fn ack(event: &'static str, result: Result<(), String>, course: &str, group: &str) -> String {
    let frame = Ack {
        event,
        success: result.is_ok(),
        reason: result.err(),
        course,
        group,
    };
    serde_json::to_string(&frame).unwrap_or_default()
}

fn push(payload: &EventPayload) -> Option<String> {
    serde_json::to_string(&Push { event: "updateUserData", success: true, data: payload }).ok()
}

#[debug_handler(state = crate::AppState)]
async fn user_ws(
    State(state): State<AppState>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(email) = session.get::<String>(EMAIL).await? else {
        return Ok((StatusCode::UNAUTHORIZED, "log in before connecting").into_response());
    };
    let uuid = identity::derive_id(&email);

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, uuid, email)))
}

async fn handle_socket(state: AppState, socket: WebSocket, uuid: Uuid, email: String) {
    debug!(%uuid, %email, "socket connected");
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    {
        let mut matcher = state.matcher.lock().await;
        for kind in EventKind::ALL {
            let tx = tx.clone();
            matcher.subscribe(
                kind,
                uuid,
                Box::new(move |payload| {
                    if let Some(json) = push(&payload) {
                        let _ = tx.send(json);
                    }
                }),
            );
        }
    }

    let (mut sender, mut receiver) = socket.split();

    let push_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => {
                let mut matcher = state.matcher.lock().await;
                let _ = tx.send(handle_frame(&mut matcher, uuid, &email, frame));
            }
            Err(err) => {
                let _ = tx.send(ack("error", Err(err.to_string()), "", ""));
            }
        }
    }

    debug!(%uuid, %email, "socket disconnected");
    // Handlers stay registered so the session can pick delivery back up by
    // reconnecting; their sends just go nowhere once the channel is gone.
    push_task.abort();
}

fn handle_frame(matcher: &mut Matcher, uuid: Uuid, email: &str, frame: ClientFrame) -> String {
    match frame {
        ClientFrame::JoinGroup { course, group, name, timezone, bio, pitch, on_match_message } => {
            let profile = Profile { name, timezone, bio, pitch, on_match_message };
            let result = matcher
                .join_group(&course, &group, email, profile)
                .map(|_| ())
                .map_err(|err| err.to_string());
            ack("joinedGroup", result, &course, &group)
        }
        ClientFrame::GetData { course, group } => {
            match matcher.user_data(&course, &group, uuid) {
                Ok(payload) => push(&payload).unwrap_or_default(),
                Err(err) => ack("updateUserData", Err(err.to_string()), &course, &group),
            }
        }
        ClientFrame::Swipe { course, group, uuid: swipee, right_swipe } => {
            let result = matcher
                .swipe(&course, &group, uuid, swipee, right_swipe)
                .map_err(|err| err.to_string());
            ack("swiped", result, &course, &group)
        }
        ClientFrame::AcceptMatch { course, group, uuid: other } => {
            let result = matcher
                .accept_match(&course, &group, uuid, other)
                .map_err(|err| err.to_string());
            ack("acceptedMatch", result, &course, &group)
        }
        ClientFrame::RejectMatch { course, group, uuid: other } => {
            let result = matcher
                .reject_match(&course, &group, uuid, other)
                .map_err(|err| err.to_string());
            ack("rejectedMatch", result, &course, &group)
        }
        ClientFrame::Chat { course, group, uuid: to, message } => {
            let result = matcher
                .send_chat(&course, &group, uuid, to, message)
                .map_err(|err| err.to_string());
            ack("sentChat", result, &course, &group)
        }
        ClientFrame::RefreshQueue { course, group } => {
            let result = matcher
                .refresh_queue(&course, &group, uuid)
                .map(|_| ())
                .map_err(|err| err.to_string());
            ack("queueRefreshed", result, &course, &group)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_parse_from_camel_case_json() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"action":"swipe","course":"CRS","group":"GRP",
                "uuid":"00000000-0000-0000-0000-000000000000","rightSwipe":true}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::Swipe { right_swipe: true, .. }));
    }

    #[test]
    fn join_frames_default_the_optional_fields() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"action":"joinGroup","course":"CRS","group":"GRP",
                "name":"Person A","timezone":"t1"}"#,
        )
        .unwrap();
        let ClientFrame::JoinGroup { bio, pitch, on_match_message, .. } = frame else {
            panic!("wrong variant");
        };
        assert_eq!(bio, "");
        assert_eq!(pitch, "");
        assert_eq!(on_match_message, None);
    }

    #[test]
    fn unknown_actions_fail_to_parse() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"action":"selfDestruct"}"#).is_err());
    }

    #[test]
    fn failure_acks_carry_the_reason() {
        let json = ack("swiped", Err("no such user in this group".to_owned()), "CRS", "GRP");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["reason"], "no such user in this group");
        assert_eq!(value["event"], "swiped");
    }
}
