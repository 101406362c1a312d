//! SkyWatch Collaborator Abstraction Layer
//!
//! This crate defines everything the SkyWatch engine exchanges with the
//! outside world, so the engine itself stays free of HTTP and socket code:
//! - **Wire types**: flight snapshots, batch/cleanup events, registry and area records
//! - **Collaborators**: `TrackSource`, `ClassificationService`, `AreaService`
//! - **Update channel**: the ordered push stream of batch-update and cleanup events
//!
//! An in-memory backend implements every collaborator for tests and the
//! simulator.
//!
//! # Example
//!
//! ```ignore
//! use skywatch_env::{update_channel, InMemoryBackend, UpdateChannel};
//!
//! let (tx, mut rx) = update_channel(64);
//! let backend = InMemoryBackend::new().with_updates(tx.clone());
//!
//! while let Some(event) = rx.recv().await {
//!     dashboard.handle_event(event);
//! }
//! ```

mod channel;
mod collaborator;
mod error;
mod memory;
mod types;

pub use channel::{decode_event, update_channel, MpscUpdateChannel, UpdateChannel, UpdateSender};
pub use collaborator::{AreaService, ClassificationService, TrackSource};
pub use error::EnvError;
pub use memory::InMemoryBackend;
pub use types::{
    AreaId, AreaRecord, BatchUpdate, Bounds, ChannelEvent, ClassificationEntry, Cleanup,
    FilterChange, FlightId, FlightSnapshot, LogMessage, PollFrequency, Sample,
    DEFAULT_CLASSIFICATION, UNKNOWN_DURATION, UNKNOWN_SCALAR,
};
