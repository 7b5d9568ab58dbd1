//! Favorites synchronization: keepers, tokens, uploads, and the
//! per-kind consistency engine.

mod engine;
mod keeper;
mod token_upload;
mod tokens;
pub(crate) mod uploader;

pub use engine::{FavoritesSync, SyncPhase, UploadSnapshot};
pub use keeper::ConsistencyKeeper;
pub use token_upload::{TokenUploadPayload, TokenUploader};
pub use tokens::{DeviceTokens, PushToken};
pub use uploader::{HttpUploader, Uploader};
