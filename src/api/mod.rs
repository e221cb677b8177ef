//! YouTrack API client and types.
//!
//! This module provides the interface for communicating with the YouTrack
//! REST API: login and session handling, retry with re-login, and decoding of
//! XML responses into entities.

pub mod auth;
mod client;
pub mod error;
pub mod factory;
pub mod retry;
pub mod session;
pub mod types;
pub mod xml;

pub use auth::Credentials;
pub use client::{
    ClientConfig, ClientHandle, Command, CreateOutput, CreatedIssue, NewIssue, Params,
    RawResponse, YouTrackClient,
};
pub use error::{ApiError, Result};
pub use factory::Entity;
pub use retry::{Reauthenticate, RetryPolicy};
pub use types::{Change, ChangeField, ChangeList, ChangeValue, FieldValue, Issue, IssueList};
