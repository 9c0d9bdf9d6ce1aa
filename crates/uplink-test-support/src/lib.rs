#![forbid(unsafe_code)]
#![warn(missing_docs, unreachable_pub)]

//! Shared test helpers used across integration suites.
//! Layout: transport.rs (recording transport), mocks.rs (fake collaborators), fixtures.rs (files and settings).

pub mod fixtures;
pub mod mocks;
pub mod transport;

pub use fixtures::{channel, fast_settings, origin_in, supergroup, write_file};
pub use mocks::{
    FakeDirectory, FakeMarkup, FakeNormalizer, FakeProbe, FakeThumbnailer, ListenerEvent,
    RecordingListener,
};
pub use transport::{Call, FakeTransport, Failure, Op, UploadCall};
