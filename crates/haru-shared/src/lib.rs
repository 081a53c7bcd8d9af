//! # haru-shared
//!
//! Domain model, wire codec and naming conventions shared by every crate in
//! the workspace: identifiers, calendar-day bucket keys, invite codes and the
//! path scheme of the remote stores.

pub mod codec;
pub mod constants;
pub mod date_key;
pub mod invite;
pub mod models;
pub mod paths;
pub mod types;

pub use codec::Wire;
pub use date_key::{BucketCalendar, DateKey};
pub use invite::{InviteCode, InviteError};
pub use models::{Comment, Gender, Group, LoginPlatform, Post, User};
pub use types::{CommentId, GroupId, PostId, Uid};
