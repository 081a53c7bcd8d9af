//! # haru-sync
//!
//! Client-side synchronisation core for Haruhancut. It keeps the signed-in
//! user, their group and the group's member roster coherent with a
//! realtime document store, writes every snapshot through to the local
//! cache, and derives the views the app renders.
//!
//! The backend is abstract: [`remote`] defines the collaborator traits and
//! [`memory`] provides in-memory implementations for tests and for the
//! simulator binary.

pub mod cell;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod mutations;
pub mod projection;
pub mod remote;
pub mod state;

pub use cell::ObservableCell;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SyncConfig;
pub use engine::{Backend, SubscriptionPhase, SyncEngine};
pub use error::{AuthError, GroupError, MutationError, RemoteError, SyncError};
pub use events::SessionEvent;
pub use mutations::{CreatedGroup, Mutations};
pub use remote::{AuthProvider, BlobStore, RemoteStore, SnapshotStream};
pub use state::{SessionSnapshot, SessionState};
