#![forbid(unsafe_code)]
#![warn(missing_docs, unreachable_pub)]

//! Upload settings and per-job options.
//!
//! Layout: `model.rs` (typed settings and job options), `validate.rs`
//! (validation/parsing helpers), `loader.rs` (JSON document plus environment
//! overrides), `defaults.rs` (fallback values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, load_settings, settings_from_str};
pub use model::{
    EffectiveToggles, JobOptions, RetrySettings, SPLIT_DIR_NAME, SeedMode, SyncedFile,
    UploadSettings,
};
pub use validate::validate_settings;
