#![forbid(unsafe_code)]
#![warn(missing_docs, unreachable_pub)]

//! Upload orchestration engine.
//!
//! Layout: `walker` and `prepare` turn a job directory into sendable files,
//! `classify`, `identity`, `retry` and `sender` deliver one file, `group` and
//! `fanout` shape and replicate what was delivered, `stats` and `cleanup`
//! close the job out, and `service` drives the whole loop.

pub mod classify;
pub mod cleanup;
pub mod error;
pub mod fanout;
pub mod group;
pub mod identity;
pub mod prepare;
pub mod retry;
pub mod sender;
pub mod service;
pub mod stats;
pub mod walker;

pub use classify::{ResolvedThumbnail, ThumbnailOrigin, parse_thumbnail_source};
pub use cleanup::{clean_unwanted, remove_if_exists};
pub use error::{EngineError, EngineResult};
pub use fanout::{BotPmTarget, DestinationSet, LogDestination, Replicator};
pub use group::{GroupBuffer, GroupKind, MAX_GROUP_SIZE, group_key, group_key_in};
pub use identity::{ELEVATED_THRESHOLD_BYTES, Identities, select_identity};
pub use prepare::{MAX_NAME_CHARS, split_extension, truncate_name};
pub use retry::RetryPolicy;
pub use sender::{Delivery, FileArtifact, FileSender};
pub use service::{
    CancelHandle, Collaborators, JobOutcome, SUPERGROUP_REQUIRED_MESSAGE, UploadJob,
    UploadRequest, UploadService,
};
pub use stats::{ALL_CORRUPTED_MESSAGE, CANCELLED_MESSAGE, JobStats, NO_FILES_MESSAGE};
pub use walker::{JobWalker, WalkEntry, natural_cmp};
