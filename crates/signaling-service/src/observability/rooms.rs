//! Read-only room inspection endpoints.
//!
//! - `GET /rooms` - every live room with its participants and call start
//! - `GET /rooms/:room_id` - one room, or 404
//!
//! Served on the health listener. Snapshots come from the signaling actor, so
//! they reflect a single consistent point in its message order.

use crate::actors::{RoomSnapshot, SignalingActorHandle};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::types::RoomId;
use tracing::warn;

/// Router with the inspection endpoints.
pub fn rooms_router(actor: SignalingActorHandle) -> Router {
    Router::new()
        .route("/rooms", get(list_rooms_handler))
        .route("/rooms/:room_id", get(get_room_handler))
        .with_state(actor)
}

async fn list_rooms_handler(State(actor): State<SignalingActorHandle>) -> Response {
    match actor.list_rooms().await {
        Ok(rooms) => Json::<Vec<RoomSnapshot>>(rooms).into_response(),
        Err(e) => {
            warn!(target: "sg.health", error = %e, "Room listing failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn get_room_handler(
    State(actor): State<SignalingActorHandle>,
    Path(room_id): Path<String>,
) -> Response {
    match actor.get_room(RoomId::new(room_id)).await {
        Ok(Some(room)) => Json(room).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(target: "sg.health", error = %e, "Room lookup failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::actors::connection::ConnectionHandle;
    use crate::protocol::{ClientEvent, JoinRoomRequest};
    use axum::body::Body;
    use axum::http::Request;
    use common::types::ConnectionId;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::util::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_rooms_endpoints() {
        let actor = SignalingActorHandle::new("sg-test".to_string(), None, Duration::from_secs(1));
        let app = rooms_router(actor.clone());

        let (status, body) = get(app.clone(), "/rooms").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let connection_id = ConnectionId::new();
        let (handle, mut rx) = ConnectionHandle::channel(connection_id, 8, actor.child_token());
        let identity = actor.connect(handle).await.unwrap();
        actor
            .dispatch(
                connection_id,
                ClientEvent::JoinRoom(JoinRoomRequest {
                    room_id: Some("r1".to_string()),
                    external_user_id: Some("user-1".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        // connected, joined-room
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        let (status, body) = get(app.clone(), "/rooms").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["roomId"], "r1");
        assert_eq!(body[0]["participants"][0]["identity"], identity.as_str());
        assert_eq!(body[0]["participants"][0]["externalUserId"], "user-1");
        assert!(body[0]["callStartedAt"].is_i64());

        let (status, body) = get(app.clone(), "/rooms/r1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roomId"], "r1");

        let (status, _) = get(app, "/rooms/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
