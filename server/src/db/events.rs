//! Events, attendance and bids.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::debug;

use super::{classify_read_error, StoreError};
use crate::types::{Bid, Event, EventDetail, PublicProfile, User};

/// Result of asking to attend an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendOutcome {
    Joined,
    AlreadyAttending,
    /// Capacity is reached.
    Full,
}

#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>("SELECT * FROM events ORDER BY date")
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    pub async fn find(&self, id: &str) -> Result<Event, StoreError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_read_error)
    }

    /// Loads the host and attendee list for `event`.
    pub async fn detail(&self, event: Event) -> Result<EventDetail, StoreError> {
        let host = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&event.host_id)
            .fetch_optional(&self.pool)
            .await?;
        let attendees = self.attendees(&event.id).await?;
        Ok(EventDetail {
            event,
            host: host.map(PublicProfile::from),
            attendees: attendees.into_iter().map(PublicProfile::from).collect(),
        })
    }

    pub async fn attendees(&self, event_id: &str) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT u.* FROM users u
             JOIN event_attendees a ON a.user_id = u.id
             WHERE a.event_id = ?
             ORDER BY a.created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn hosted_by(&self, host_id: &str) -> Result<Vec<Event>, StoreError> {
        let events =
            sqlx::query_as::<_, Event>("SELECT * FROM events WHERE host_id = ? ORDER BY date")
                .bind(host_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(events)
    }

    pub async fn attended_by(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT e.* FROM events e
             JOIN event_attendees a ON a.event_id = e.id
             WHERE a.user_id = ?
             ORDER BY e.date",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// Inserts the event and bumps the host's hosted-events counter.
    pub async fn create(&self, event: Event) -> Result<Event, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO events (
                id, title, description, date, location, host_id, category, images,
                min_bid, capacity, bid_deadline, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(&event.location)
        .bind(&event.host_id)
        .bind(&event.category)
        .bind(Json(&event.images))
        .bind(event.min_bid)
        .bind(event.capacity)
        .bind(event.bid_deadline)
        .bind(event.status)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET events_hosted_count = events_hosted_count + 1 WHERE id = ?")
            .bind(&event.host_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(event_id = %event.id, host_id = %event.host_id, "Event created");
        Ok(event)
    }

    pub async fn update(&self, event: Event) -> Result<Event, StoreError> {
        let result = sqlx::query(
            "UPDATE events SET
                title = ?, description = ?, date = ?, location = ?, category = ?,
                images = ?, min_bid = ?, capacity = ?, bid_deadline = ?, status = ?,
                updated_at = ?
            WHERE id = ?",
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(&event.location)
        .bind(&event.category)
        .bind(Json(&event.images))
        .bind(event.min_bid)
        .bind(event.capacity)
        .bind(event.bid_deadline)
        .bind(event.status)
        .bind(event.updated_at)
        .bind(&event.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(event)
    }

    /// Deletes the event and decrements the host's events-hosted counter.
    /// Attendance rows and bids go with it.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let host_id: Option<(String,)> =
            sqlx::query_as("DELETE FROM events WHERE id = ? RETURNING host_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((host_id,)) = host_id else {
            return Err(StoreError::NotFound);
        };

        sqlx::query(
            "UPDATE users SET events_hosted_count = MAX(events_hosted_count - 1, 0) WHERE id = ?",
        )
        .bind(&host_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(event_id = %id, host_id = %host_id, "Event deleted");
        Ok(())
    }

    /// Adds `user_id` to the attendee list if there is room.
    ///
    /// The capacity check and the insert are one statement, so two requests
    /// racing for the last seat cannot both get it.
    pub async fn attend(
        &self,
        event: &Event,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AttendOutcome, StoreError> {
        let (already,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM event_attendees WHERE event_id = ? AND user_id = ?",
        )
        .bind(&event.id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        if already > 0 {
            return Ok(AttendOutcome::AlreadyAttending);
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO event_attendees (event_id, user_id, created_at)
             SELECT ?, ?, ?
             WHERE (SELECT COUNT(*) FROM event_attendees WHERE event_id = ?) < ?",
        )
        .bind(&event.id)
        .bind(user_id)
        .bind(now)
        .bind(&event.id)
        .bind(event.capacity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(AttendOutcome::Full);
        }
        Ok(AttendOutcome::Joined)
    }

    /// Removes `user_id` from the attendee list. Returns whether they were on it.
    pub async fn unattend(&self, event_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM event_attendees WHERE event_id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn place_bid(&self, bid: Bid) -> Result<Bid, StoreError> {
        sqlx::query(
            "INSERT INTO bids (id, event_id, user_id, amount, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&bid.id)
        .bind(&bid.event_id)
        .bind(&bid.user_id)
        .bind(bid.amount)
        .bind(bid.created_at)
        .bind(bid.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(bid_id = %bid.id, event_id = %bid.event_id, "Bid placed");
        Ok(bid)
    }

    /// Bids on one event, highest first.
    pub async fn bids_for_event(&self, event_id: &str) -> Result<Vec<Bid>, StoreError> {
        let bids = sqlx::query_as::<_, Bid>(
            "SELECT * FROM bids WHERE event_id = ? ORDER BY amount DESC, created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bids)
    }

    /// Bids placed by one user, newest first.
    pub async fn bids_by_user(&self, user_id: &str) -> Result<Vec<Bid>, StoreError> {
        let bids = sqlx::query_as::<_, Bid>(
            "SELECT * FROM bids WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bids)
    }
}
