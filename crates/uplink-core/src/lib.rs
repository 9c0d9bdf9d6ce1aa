#![forbid(unsafe_code)]
#![warn(missing_docs, unreachable_pub)]

//! Transport-agnostic upload interfaces and DTOs.
//!
//! Layout: `model` (messages, media kinds, job results), `service`
//! (collaborator traits consumed by the engine), `progress` (shared transfer
//! counters and the cancellation flag), `error` (transport error taxonomy).

pub mod error;
pub mod model;
pub mod progress;
pub mod service;

pub use error::{TransportError, TransportResult};
pub use model::{
    AudioUpload, ChatKind, ChatRef, CopyRequest, DeliveredLink, DeliveredMedia, DocumentUpload,
    Identity, InputMedia, JobResult, MediaInfo, MediaKind, MediaTraits, MessageRef,
    NormalizedName, PhotoUpload, ReplyMarkup, SentMessage, ThumbnailSource, UploadCommon,
    UrlButton, VideoUpload,
};
pub use progress::{CancelFlag, UploadProgress};
pub use service::{
    DestinationDirectory, FileNormalizer, MarkupBuilder, MarkupRequest, MediaProbe,
    MessageTransport, Thumbnailer, UploadListener,
};
