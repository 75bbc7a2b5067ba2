//! Profile endpoints.

use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AppJson, AppState};
use crate::error::ServerError;
use crate::identity::CurrentUser;
use crate::types::{
    BidEvent, BidStatus, DrinkingStatus, EducationLevel, Event, Gender, PublicProfile, Role,
    User,
};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).put(update_me))
        .route("/users/me/events", get(my_bid_events))
        .route("/users/influencers", get(list_influencers))
        .route("/users/{id}", get(get_user))
}

/// The current user with the events they host and attend.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub events_hosted: Vec<Event>,
    pub events_attended: Vec<Event>,
    pub events_hosted_count: i64,
}

async fn profile(state: &AppState, user: User) -> Result<ProfileResponse, ServerError> {
    let events_hosted = if user.role.is_influencer() {
        state.events.hosted_by(&user.id).await?
    } else {
        Vec::new()
    };
    let events_attended = state.events.attended_by(&user.id).await?;

    Ok(ProfileResponse {
        events_hosted_count: user.events_hosted_count,
        user,
        events_hosted,
        events_attended,
    })
}

async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ProfileResponse>, ServerError> {
    Ok(Json(profile(&state, user).await?))
}

/// Partial profile update. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub media_gallery: Option<Vec<String>>,
    pub profile_photos: Option<Vec<String>>,
    pub cover_photo_url: Option<String>,
    pub instagram_handle: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub location: Option<String>,
    pub height: Option<i32>,
    pub work: Option<String>,
    pub education: Option<String>,
    pub education_level: Option<EducationLevel>,
    pub drinking: Option<DrinkingStatus>,
    pub interests: Option<Vec<String>>,
    pub government_id_url: Option<String>,
}

impl ProfileUpdate {
    /// Applies the update to `user`.
    ///
    /// New profile photos also replace the avatar with the first photo.
    /// Cover photo and Instagram handle only apply to influencers.
    pub fn apply(self, user: &mut User) -> Result<(), ServerError> {
        if let Some(name) = self.name {
            user.name = super::required("name", &name)?;
        }
        if let Some(age) = self.age {
            if age < super::auth::MIN_AGE {
                return Err(ServerError::validation(format!(
                    "age must be at least {}",
                    super::auth::MIN_AGE
                )));
            }
            user.age = Some(age);
        }
        if let Some(avatar_url) = self.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        if let Some(photos) = self.profile_photos {
            if let Some(first) = photos.first() {
                user.avatar_url = Some(first.clone());
            }
            user.profile_photos = photos;
        }
        if let Some(media_gallery) = self.media_gallery {
            user.media_gallery = media_gallery;
        }
        if let Some(interests) = self.interests {
            user.interests = interests;
        }
        if user.role.is_influencer() {
            if let Some(cover) = self.cover_photo_url {
                user.cover_photo_url = Some(cover);
            }
            if let Some(handle) = self.instagram_handle {
                user.instagram_handle = Some(handle);
            }
        }

        user.bio = self.bio.or(user.bio.take());
        user.gender = self.gender.or(user.gender);
        user.location = self.location.or(user.location.take());
        user.height = self.height.or(user.height);
        user.work = self.work.or(user.work.take());
        user.education = self.education.or(user.education.take());
        user.education_level = self.education_level.or(user.education_level);
        user.drinking = self.drinking.or(user.drinking);
        user.government_id_url = self.government_id_url.or(user.government_id_url.take());
        Ok(())
    }
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(mut user): CurrentUser,
    AppJson(update): AppJson<ProfileUpdate>,
) -> Result<Json<ProfileResponse>, ServerError> {
    update.apply(&mut user)?;
    user.updated_at = state.tokens.now();

    let user = state.users.save(user).await?;
    info!(user_id = %user.id, "Profile updated");
    Ok(Json(profile(&state, user).await?))
}

#[derive(Debug, Serialize)]
pub struct PublicProfileResponse {
    pub user: PublicProfile,
    pub events_hosted: Vec<Event>,
}

/// Another user's profile. Unknown ids are 404.
async fn get_user(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<PublicProfileResponse>, ServerError> {
    let user = state.users.find_by_id(&id).await?;
    let events_hosted = if user.role.is_influencer() {
        state.events.hosted_by(&user.id).await?
    } else {
        Vec::new()
    };
    Ok(Json(PublicProfileResponse {
        user: user.into(),
        events_hosted,
    }))
}

async fn list_influencers(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> Result<Json<Vec<PublicProfile>>, ServerError> {
    let influencers = state.users.list_by_role(Role::Influencer).await?;
    Ok(Json(influencers.into_iter().map(PublicProfile::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct BidEventsResponse {
    pub events: Vec<BidEvent>,
}

/// Events the caller has bid on, one entry per event carrying the latest bid.
async fn my_bid_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<BidEventsResponse>, ServerError> {
    let now = state.tokens.now();
    let bids = state.events.bids_by_user(user.id()).await?;

    let mut seen = HashSet::new();
    let mut events = Vec::new();
    // Newest first, so the first bid per event is the latest.
    for bid in bids {
        if !seen.insert(bid.event_id.clone()) {
            continue;
        }
        let event = match state.events.find(&bid.event_id).await {
            Ok(event) => event,
            Err(err) if err.is_not_found() => continue,
            Err(err) => return Err(err.into()),
        };
        events.push(BidEvent {
            bid_status: BidStatus::at(event.bid_deadline, now),
            bid_amount: bid.amount,
            bid_placed_at: bid.created_at,
            event,
        });
    }

    Ok(Json(BidEventsResponse { events }))
}
