//! Domain types for the Spotlight server.
//!
//! These are the records the store persists and the handlers return. JSON
//! field names are snake_case. List-valued columns (`media_gallery`,
//! `images`, ...) are stored as JSON text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::password::PasswordDigest;

/// Account role. Only influencers can host events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Fan,
    Influencer,
}

impl Role {
    pub fn is_influencer(self) -> bool {
        matches!(self, Self::Influencer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EducationLevel {
    HighSchool,
    Bachelors,
    Masters,
    Phd,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DrinkingStatus {
    Yes,
    No,
    Social,
    Rarely,
}

/// A registered account.
///
/// The password hash is never serialized and prints as `<redacted>`.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: PasswordDigest,
    pub role: Role,
    pub mobile_number: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    #[sqlx(json)]
    pub media_gallery: Vec<String>,
    #[sqlx(json)]
    pub profile_photos: Vec<String>,
    #[sqlx(json)]
    pub interests: Vec<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub location: Option<String>,
    pub height: Option<i32>,
    pub work: Option<String>,
    pub education: Option<String>,
    pub education_level: Option<EducationLevel>,
    pub drinking: Option<DrinkingStatus>,
    pub cover_photo_url: Option<String>,
    pub instagram_handle: Option<String>,
    pub follower_count: i64,
    pub wallet_balance: f64,
    pub government_id_url: Option<String>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub events_hosted_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh account with every optional profile field empty.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: PasswordDigest,
        role: Role,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            username: username.into(),
            email: email.into(),
            password_hash,
            role,
            mobile_number: None,
            avatar_url: None,
            bio: None,
            media_gallery: Vec::new(),
            profile_photos: Vec::new(),
            interests: Vec::new(),
            age: None,
            gender: None,
            location: None,
            height: None,
            work: None,
            education: None,
            education_level: None,
            drinking: None,
            cover_photo_url: None,
            instagram_handle: None,
            follower_count: 0,
            wallet_balance: 0.0,
            government_id_url: None,
            is_verified: false,
            verified_at: None,
            events_hosted_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What other signed-in users see of an account.
///
/// Leaves out contact details, the wallet and verification documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: String,
    pub name: String,
    pub username: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub media_gallery: Vec<String>,
    pub profile_photos: Vec<String>,
    pub interests: Vec<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub location: Option<String>,
    pub height: Option<i32>,
    pub work: Option<String>,
    pub education: Option<String>,
    pub education_level: Option<EducationLevel>,
    pub drinking: Option<DrinkingStatus>,
    pub cover_photo_url: Option<String>,
    pub instagram_handle: Option<String>,
    pub follower_count: i64,
    pub is_verified: bool,
    pub events_hosted_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            username: user.username,
            role: user.role,
            avatar_url: user.avatar_url,
            bio: user.bio,
            media_gallery: user.media_gallery,
            profile_photos: user.profile_photos,
            interests: user.interests,
            age: user.age,
            gender: user.gender,
            location: user.location,
            height: user.height,
            work: user.work,
            education: user.education,
            education_level: user.education_level,
            drinking: user.drinking,
            cover_photo_url: user.cover_photo_url,
            instagram_handle: user.instagram_handle,
            follower_count: user.follower_count,
            is_verified: user.is_verified,
            events_hosted_count: user.events_hosted_count,
            created_at: user.created_at,
        }
    }
}

/// Lifecycle state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Past,
    Cancelled,
}

/// An event hosted by an influencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub host_id: String,
    pub category: String,
    #[sqlx(json)]
    pub images: Vec<String>,
    pub min_bid: f64,
    pub capacity: i32,
    pub bid_deadline: DateTime<Utc>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event together with its host and attendees.
#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub host: Option<PublicProfile>,
    pub attendees: Vec<PublicProfile>,
}

/// A fan's bid to attend an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Bid {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a bid can still be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Expired,
}

impl BidStatus {
    /// `Pending` until the event's bid deadline, `Expired` from then on.
    pub fn at(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < deadline {
            Self::Pending
        } else {
            Self::Expired
        }
    }
}

/// An event the current user has bid on, with their bid.
#[derive(Debug, Clone, Serialize)]
pub struct BidEvent {
    #[serde(flatten)]
    pub event: Event,
    pub bid_amount: f64,
    pub bid_status: BidStatus,
    pub bid_placed_at: DateTime<Utc>,
}

/// A bid as the host sees it when reviewing who wants to attend.
#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: String,
    pub event_id: String,
    pub fan_id: String,
    pub fan: Option<PublicProfile>,
    pub bid_amount: f64,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

/// A one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }
}

/// A chat with both participants and its messages, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ChatDetail {
    #[serde(flatten)]
    pub chat: Chat,
    pub user1: Option<PublicProfile>,
    pub user2: Option<PublicProfile>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[sqlx(rename = "is_read")]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_user() -> User {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        User::new(
            "u-1",
            "Ada",
            "ada1234",
            "ada@example.com",
            PasswordDigest::from_stored("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"),
            Role::Fan,
            now,
        )
    }

    #[test]
    fn user_json_never_contains_password_hash() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(!json.to_string().contains("argon2"));
        assert_eq!(json["role"], "fan");
        assert_eq!(json["media_gallery"], serde_json::json!([]));
    }

    #[test]
    fn user_debug_redacts_hash() {
        let debug = format!("{:?}", sample_user());
        assert!(!debug.contains("argon2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn enums_use_snake_case() {
        assert_eq!(
            serde_json::to_string(&EducationLevel::HighSchool).unwrap(),
            "\"high_school\""
        );
        assert_eq!(serde_json::to_string(&Role::Influencer).unwrap(), "\"influencer\"");
        assert_eq!(
            serde_json::from_str::<DrinkingStatus>("\"social\"").unwrap(),
            DrinkingStatus::Social
        );
        assert!(serde_json::from_str::<Role>("\"admin\"").is_err());
    }

    #[test]
    fn bid_status_flips_at_deadline() {
        let deadline = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        assert_eq!(
            BidStatus::at(deadline, deadline - Duration::seconds(1)),
            BidStatus::Pending
        );
        assert_eq!(BidStatus::at(deadline, deadline), BidStatus::Expired);
    }

    #[test]
    fn chat_participants() {
        let now = Utc::now();
        let chat = Chat {
            id: "c-1".to_string(),
            user1_id: "a".to_string(),
            user2_id: "b".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert!(chat.has_participant("a"));
        assert!(chat.has_participant("b"));
        assert!(!chat.has_participant("c"));
    }
}
