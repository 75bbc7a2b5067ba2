//! Spotlight Server - REST backend for influencer events.
//!
//! Users register, sign in, host and browse events, bid to attend, chat and
//! upload media. Everything except the public auth endpoints is reached with
//! a bearer token.
//!
//! # Architecture
//!
//! - [`db`] persists users, events, bids and chats in SQLite.
//! - [`auth`] and [`password`] issue tokens and hash passwords.
//! - [`identity`] turns a bearer token into a [`CurrentUser`](identity::CurrentUser)
//!   for every protected request.
//! - [`oauth`] verifies Google and Firebase identity tokens for sign-in.
//! - [`routes`] holds the handlers, [`layers`] the edge middleware around them.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod layers;
pub mod oauth;
pub mod password;
pub mod rate_limit;
pub mod routes;
pub mod types;
