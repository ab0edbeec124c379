//! A client for the signwatch REST API.
//!
//! Every authenticated call takes an explicit [AuthSession]; nothing is stored in globals.
//! Expired access tokens are refreshed before the request goes out, and a `401` gets
//! exactly one refresh-and-retry before the error is returned.
mod auth;
mod client;
mod error;
mod history;
mod model;
mod validate;

pub use auth::*;
pub use client::*;
pub use error::*;
pub use history::*;
pub use model::*;
pub use validate::*;
