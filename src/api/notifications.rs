use actix_web::{HttpResponse, Responder, http::header, web, web::Bytes};
use futures::{Stream, StreamExt, stream};
use tokio::sync::broadcast::{Receiver, error::RecvError};

use crate::auth::auth::AuthUser;
use crate::services::notifier::{Notification, NotificationHub, Recipient};

/// One Server-Sent Events frame: `event: <kind>` then the JSON payload.
pub fn sse_frame(notification: &Notification) -> Option<Bytes> {
    match serde_json::to_string(notification) {
        Ok(data) => Some(Bytes::from(format!("event: {}\ndata: {}\n\n", notification.kind, data))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize notification");
            None
        }
    }
}

/// Frames addressed to `recipient`, starting with a `connected` comment.
/// Lagging listeners skip what they missed; the stream ends when the hub closes.
pub fn notification_stream(
    rx: Receiver<Notification>,
    recipient: Recipient,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    let hello = stream::once(async { Ok::<_, actix_web::Error>(Bytes::from_static(b": connected\n\n")) });

    let events = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(notification) if recipient.accepts(&notification) => {
                    if let Some(frame) = sse_frame(&notification) {
                        return Some((Ok::<_, actix_web::Error>(frame), rx));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = recipient.user_id, skipped, "Notification listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    hello.chain(events)
}

/// Live notifications for the caller
///
/// Browsers' `EventSource` cannot send headers, so the token may be passed as
/// `?access_token=`.
#[utoipa::path(
    get,
    path = "/api/notifications/stream",
    params(("access_token" = Option<String>, Query, description = "Access token for EventSource clients")),
    responses((status = 200, description = "text/event-stream of notifications", content_type = "text/event-stream")),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn stream_notifications(auth: AuthUser, hub: web::Data<NotificationHub>) -> impl Responder {
    tracing::info!(user_id = auth.user_id, "Notification stream opened");

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(notification_stream(hub.subscribe(), auth.recipient()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::{NotificationKind, Target};

    #[test]
    fn frame_names_the_event() {
        let n = Notification::new(Target::User(3), NotificationKind::TaskAssigned, "New task", "Weekly posts");
        let frame = sse_frame(&n).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: TaskAssigned\ndata: {"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"title\":\"New task\""));
    }

    #[actix_web::test]
    async fn stream_only_yields_own_notifications() {
        let hub = NotificationHub::new(8);
        let me = Recipient { user_id: 7, department_id: Some(2), is_admin: false };
        let mut events = Box::pin(notification_stream(hub.subscribe(), me));

        hub.notify_user(8, NotificationKind::RequestApproved, "Approved", "not for me");
        hub.notify_admins(NotificationKind::RequestSubmitted, "New request", "admins only");
        hub.notify_department(2, NotificationKind::Announcement, "Heads up", "team meeting");

        let hello = events.next().await.unwrap().unwrap();
        assert_eq!(&hello[..], b": connected\n\n");

        let frame = events.next().await.unwrap().unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: Announcement"));
        assert!(text.contains("team meeting"));
    }

    #[actix_web::test]
    async fn stream_ends_when_hub_is_dropped() {
        let hub = NotificationHub::new(4);
        let me = Recipient { user_id: 1, department_id: None, is_admin: true };
        let mut events = Box::pin(notification_stream(hub.subscribe(), me));
        drop(hub);

        assert!(events.next().await.is_some());
        assert!(events.next().await.is_none());
    }
}
