//! Event, attendance, bid and application endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::{required, AppJson, AppState, MessageResponse};
use crate::db::AttendOutcome;
use crate::error::ServerError;
use crate::identity::CurrentUser;
use crate::types::{
    Application, Bid, BidStatus, Event, EventDetail, EventStatus, PublicProfile,
};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/{id}/attend", post(attend_event))
        .route("/events/{id}/unattend", post(unattend_event))
        .route("/events/{id}/bid", post(place_bid))
        .route("/applications/event/{event_id}", get(list_applications))
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, ServerError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| {
            ServerError::validation(format!(
                "{field} must be an RFC 3339 timestamp, e.g. 2024-03-20T15:00:00Z"
            ))
        })
}

fn check_capacity(capacity: i32) -> Result<i32, ServerError> {
    if capacity < 1 {
        return Err(ServerError::validation("capacity must be at least 1"));
    }
    Ok(capacity)
}

fn check_min_bid(min_bid: f64) -> Result<f64, ServerError> {
    if !min_bid.is_finite() || min_bid < 0.0 {
        return Err(ServerError::validation("min_bid must be zero or more"));
    }
    Ok(min_bid)
}

/// Loads the event and checks `user` hosts it.
async fn hosted_event(
    state: &AppState,
    id: &str,
    user: &CurrentUser,
) -> Result<Event, ServerError> {
    let event = state.events.find(id).await?;
    if event.host_id != user.id() {
        debug!(event_id = %event.id, user_id = %user.id(), "Caller is not the host");
        return Err(ServerError::forbidden("only the host can manage this event"));
    }
    Ok(event)
}

// ============================================================================
// Events
// ============================================================================

async fn list_events(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> Result<Json<Vec<Event>>, ServerError> {
    Ok(Json(state.events.list().await?))
}

async fn get_event(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<EventDetail>, ServerError> {
    let event = state.events.find(&id).await?;
    Ok(Json(state.events.detail(event).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub category: String,
    pub min_bid: f64,
    pub capacity: i32,
    pub bid_deadline: String,
    #[serde(default)]
    pub images: Vec<String>,
}

async fn create_event(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), ServerError> {
    if !user.0.role.is_influencer() {
        return Err(ServerError::forbidden("only influencers can host events"));
    }

    let now = state.tokens.now();
    let event = Event {
        id: Uuid::new_v4().to_string(),
        title: required("title", &req.title)?,
        description: required("description", &req.description)?,
        date: parse_timestamp("date", &req.date)?,
        location: required("location", &req.location)?,
        host_id: user.id().to_string(),
        category: required("category", &req.category)?,
        images: req.images,
        min_bid: check_min_bid(req.min_bid)?,
        capacity: check_capacity(req.capacity)?,
        bid_deadline: parse_timestamp("bid_deadline", &req.bid_deadline)?,
        status: EventStatus::Upcoming,
        created_at: now,
        updated_at: now,
    };

    let event = state.events.create(event).await?;
    info!(event_id = %event.id, host_id = %event.host_id, "Event created");
    Ok((StatusCode::CREATED, Json(event)))
}

/// Partial event update. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub min_bid: Option<f64>,
    pub capacity: Option<i32>,
    pub bid_deadline: Option<String>,
    pub status: Option<EventStatus>,
    pub images: Option<Vec<String>>,
}

impl UpdateEventRequest {
    fn apply(self, event: &mut Event) -> Result<(), ServerError> {
        if let Some(title) = self.title {
            event.title = required("title", &title)?;
        }
        if let Some(description) = self.description {
            event.description = required("description", &description)?;
        }
        if let Some(location) = self.location {
            event.location = required("location", &location)?;
        }
        if let Some(category) = self.category {
            event.category = required("category", &category)?;
        }
        if let Some(date) = self.date {
            event.date = parse_timestamp("date", &date)?;
        }
        if let Some(deadline) = self.bid_deadline {
            event.bid_deadline = parse_timestamp("bid_deadline", &deadline)?;
        }
        if let Some(min_bid) = self.min_bid {
            event.min_bid = check_min_bid(min_bid)?;
        }
        if let Some(capacity) = self.capacity {
            event.capacity = check_capacity(capacity)?;
        }
        if let Some(images) = self.images {
            event.images = images;
        }
        if let Some(status) = self.status {
            event.status = status;
        }
        Ok(())
    }
}

async fn update_event(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateEventRequest>,
) -> Result<Json<Event>, ServerError> {
    let mut event = hosted_event(&state, &id, &user).await?;
    req.apply(&mut event)?;
    event.updated_at = state.tokens.now();

    let event = state.events.update(event).await?;
    info!(event_id = %event.id, "Event updated");
    Ok(Json(event))
}

async fn delete_event(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ServerError> {
    let event = hosted_event(&state, &id, &user).await?;
    state.events.delete(&event.id).await?;

    info!(event_id = %event.id, "Event deleted");
    Ok(MessageResponse::new("event deleted"))
}

// ============================================================================
// Attendance
// ============================================================================

async fn attend_event(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ServerError> {
    let event = state.events.find(&id).await?;

    match state
        .events
        .attend(&event, user.id(), state.tokens.now())
        .await?
    {
        AttendOutcome::Joined => {
            info!(event_id = %event.id, user_id = %user.id(), "User attending event");
            Ok(MessageResponse::new("attending event"))
        }
        AttendOutcome::AlreadyAttending => Ok(MessageResponse::new("already attending event")),
        AttendOutcome::Full => Err(ServerError::validation("event is full")),
    }
}

async fn unattend_event(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ServerError> {
    let event = state.events.find(&id).await?;
    if state.events.unattend(&event.id, user.id()).await? {
        info!(event_id = %event.id, user_id = %user.id(), "User left event");
    }
    Ok(MessageResponse::new("no longer attending event"))
}

// ============================================================================
// Bids and applications
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub amount: f64,
}

async fn place_bid(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<BidRequest>,
) -> Result<(StatusCode, Json<Bid>), ServerError> {
    let event = state.events.find(&id).await?;
    let now = state.tokens.now();

    if BidStatus::at(event.bid_deadline, now) == BidStatus::Expired {
        return Err(ServerError::validation("bid deadline has passed"));
    }
    if !req.amount.is_finite() || req.amount < event.min_bid {
        return Err(ServerError::validation(format!(
            "bid must be at least {}",
            event.min_bid
        )));
    }

    let bid = state
        .events
        .place_bid(Bid {
            id: Uuid::new_v4().to_string(),
            event_id: event.id,
            user_id: user.id().to_string(),
            amount: req.amount,
            created_at: now,
            updated_at: now,
        })
        .await?;

    info!(bid_id = %bid.id, event_id = %bid.event_id, user_id = %bid.user_id, "Bid placed");
    Ok((StatusCode::CREATED, Json(bid)))
}

/// Bids on an event, highest first, as the host reviews them.
async fn list_applications(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Application>>, ServerError> {
    let event = hosted_event(&state, &event_id, &user).await?;
    let status = BidStatus::at(event.bid_deadline, state.tokens.now());

    let bids = state.events.bids_for_event(&event.id).await?;
    let mut applications = Vec::with_capacity(bids.len());
    for bid in bids {
        let fan = match state.users.find_by_id(&bid.user_id).await {
            Ok(fan) => Some(PublicProfile::from(fan)),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };
        applications.push(Application {
            id: bid.id,
            event_id: bid.event_id,
            fan_id: bid.user_id,
            fan,
            bid_amount: bid.amount,
            status,
            created_at: bid.created_at,
        });
    }

    Ok(Json(applications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use crate::routes::tests::{json_body, seed_user, send, test_state};
    use crate::types::Role;
    use axum::http::Method;
    use chrono::Duration;
    use serde_json::{json, Value};

    fn event_body(deadline: DateTime<Utc>, capacity: i32) -> Value {
        json!({
            "title": "Rooftop session",
            "description": "Acoustic set",
            "date": (deadline + Duration::days(1)).to_rfc3339(),
            "location": "Mumbai",
            "category": "music",
            "min_bid": 50.0,
            "capacity": capacity,
            "bid_deadline": deadline.to_rfc3339(),
        })
    }

    #[test]
    fn timestamps_must_be_rfc3339() {
        assert!(parse_timestamp("date", "2024-03-20T15:00:00Z").is_ok());
        assert!(parse_timestamp("date", "2024-03-20T15:00:00+05:30").is_ok());
        assert!(parse_timestamp("date", "2024-03-20").is_err());
        assert!(parse_timestamp("date", "tomorrow").is_err());
    }

    #[tokio::test]
    async fn only_influencers_create_events() {
        let state = test_state().await;
        let (_, fan) = seed_user(&state, "fan1", Role::Fan).await;
        let (host, influencer) = seed_user(&state, "inf1", Role::Influencer).await;
        let deadline = state.tokens.now() + Duration::days(2);
        let app = create_router(state.clone());

        let response = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&fan),
            Some(event_body(deadline, 10)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&influencer),
            Some(event_body(deadline, 10)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let event: Event = json_body(response).await;
        assert_eq!(event.host_id, host.id);
        assert_eq!(event.status, EventStatus::Upcoming);

        let host = state.users.find_by_id(&host.id).await.unwrap();
        assert_eq!(host.events_hosted_count, 1);
    }

    #[tokio::test]
    async fn bad_dates_are_rejected() {
        let state = test_state().await;
        let (_, influencer) = seed_user(&state, "inf1", Role::Influencer).await;
        let app = create_router(state.clone());

        let mut body = event_body(state.tokens.now(), 10);
        body["date"] = json!("next friday");
        let response = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&influencer),
            Some(body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_host_updates_and_deletes() {
        let state = test_state().await;
        let (_, host) = seed_user(&state, "inf1", Role::Influencer).await;
        let (_, other) = seed_user(&state, "inf2", Role::Influencer).await;
        let deadline = state.tokens.now() + Duration::days(2);
        let app = create_router(state);

        let created = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&host),
            Some(event_body(deadline, 5)),
        )
        .await;
        let event: Event = json_body(created).await;
        let uri = format!("/api/v1/events/{}", event.id);

        let response = send(
            &app,
            Method::PUT,
            &uri,
            Some(&other),
            Some(json!({"title": "Mine now"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = send(&app, Method::DELETE, &uri, Some(&other), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &app,
            Method::PUT,
            &uri,
            Some(&host),
            Some(json!({"title": "Renamed", "capacity": 8})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated: Event = json_body(response).await;
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.capacity, 8);

        let response = send(&app, Method::DELETE, &uri, Some(&host), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, Method::GET, &uri, Some(&host), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn attendance_respects_capacity() {
        let state = test_state().await;
        let (_, host) = seed_user(&state, "inf1", Role::Influencer).await;
        let (_, fan1) = seed_user(&state, "fan1", Role::Fan).await;
        let (_, fan2) = seed_user(&state, "fan2", Role::Fan).await;
        let deadline = state.tokens.now() + Duration::days(2);
        let app = create_router(state);

        let created = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&host),
            Some(event_body(deadline, 1)),
        )
        .await;
        let event: Event = json_body(created).await;
        let attend = format!("/api/v1/events/{}/attend", event.id);

        assert_eq!(
            send(&app, Method::POST, &attend, Some(&fan1), None).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            send(&app, Method::POST, &attend, Some(&fan1), None).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            send(&app, Method::POST, &attend, Some(&fan2), None).await.status(),
            StatusCode::BAD_REQUEST
        );

        let unattend = format!("/api/v1/events/{}/unattend", event.id);
        assert_eq!(
            send(&app, Method::POST, &unattend, Some(&fan1), None).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            send(&app, Method::POST, &attend, Some(&fan2), None).await.status(),
            StatusCode::OK
        );

        let detail = send(
            &app,
            Method::GET,
            &format!("/api/v1/events/{}", event.id),
            Some(&fan2),
            None,
        )
        .await;
        let detail: Value = json_body(detail).await;
        assert_eq!(detail["attendees"].as_array().unwrap().len(), 1);
        assert_eq!(detail["host"]["id"], "inf1");
    }

    #[tokio::test]
    async fn bids_checked_against_minimum_and_deadline() {
        let state = test_state().await;
        let (_, host) = seed_user(&state, "inf1", Role::Influencer).await;
        let (_, fan) = seed_user(&state, "fan1", Role::Fan).await;
        let now = state.tokens.now();
        let app = create_router(state);

        let open = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&host),
            Some(event_body(now + Duration::days(2), 5)),
        )
        .await;
        let open: Event = json_body(open).await;
        let closed = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&host),
            Some(event_body(now - Duration::hours(1), 5)),
        )
        .await;
        let closed: Event = json_body(closed).await;

        let bid = |id: &str| format!("/api/v1/events/{id}/bid");

        let low = send(
            &app,
            Method::POST,
            &bid(&open.id),
            Some(&fan),
            Some(json!({"amount": 10.0})),
        )
        .await;
        assert_eq!(low.status(), StatusCode::BAD_REQUEST);

        let late = send(
            &app,
            Method::POST,
            &bid(&closed.id),
            Some(&fan),
            Some(json!({"amount": 100.0})),
        )
        .await;
        assert_eq!(late.status(), StatusCode::BAD_REQUEST);

        let ok = send(
            &app,
            Method::POST,
            &bid(&open.id),
            Some(&fan),
            Some(json!({"amount": 75.0})),
        )
        .await;
        assert_eq!(ok.status(), StatusCode::CREATED);
        let placed: Bid = json_body(ok).await;
        assert_eq!(placed.amount, 75.0);
        assert_eq!(placed.user_id, "fan1");

        let mine = send(&app, Method::GET, "/api/v1/users/me/events", Some(&fan), None).await;
        let mine: Value = json_body(mine).await;
        assert_eq!(mine["events"][0]["id"], open.id);
        assert_eq!(mine["events"][0]["bid_amount"], 75.0);
        assert_eq!(mine["events"][0]["bid_status"], "pending");
    }

    #[tokio::test]
    async fn applications_are_host_only() {
        let state = test_state().await;
        let (_, host) = seed_user(&state, "inf1", Role::Influencer).await;
        let (_, fan) = seed_user(&state, "fan1", Role::Fan).await;
        let deadline = state.tokens.now() + Duration::days(2);
        let app = create_router(state);

        let created = send(
            &app,
            Method::POST,
            "/api/v1/events",
            Some(&host),
            Some(event_body(deadline, 5)),
        )
        .await;
        let event: Event = json_body(created).await;
        send(
            &app,
            Method::POST,
            &format!("/api/v1/events/{}/bid", event.id),
            Some(&fan),
            Some(json!({"amount": 60.0})),
        )
        .await;

        let uri = format!("/api/v1/applications/event/{}", event.id);
        let denied = send(&app, Method::GET, &uri, Some(&fan), None).await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::GET, &uri, Some(&host), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let applications: Vec<Value> = json_body(response).await;
        assert_eq!(applications.len(), 1);
        assert_eq!(applications[0]["fan_id"], "fan1");
        assert_eq!(applications[0]["fan"]["username"], "fan1");
        assert_eq!(applications[0]["status"], "pending");
    }
}
