//! youtrack-client - an async client for the YouTrack REST API
//!
//! The client logs in with a login/password pair, keeps the session cookie,
//! and transparently logs in again or backs off when the server refuses a
//! request. XML responses are decoded into entities such as [`api::Issue`].
//!
//! ```no_run
//! use youtrack_client::api::{CreateOutput, CreatedIssue, NewIssue, YouTrackClient};
//!
//! # async fn demo() -> youtrack_client::api::Result<()> {
//! let client = YouTrackClient::connect("https://yt.example.com", "root", "secret").await?;
//! let created = client
//!     .create_issue(&NewIssue::new("DEMO", "Bug"), CreateOutput::Id)
//!     .await?;
//! if let Some(CreatedIssue::Id(id)) = created {
//!     let issue = client.get_issue(&id, false).await?;
//!     println!("{:?}", issue.and_then(|i| i.summary().map(str::to_string)));
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
