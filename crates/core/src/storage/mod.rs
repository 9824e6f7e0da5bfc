//! Object storage for source documents and conclusion artifacts.

mod fs_store;
mod signing;
mod traits;

pub use fs_store::FsObjectStore;
pub use signing::{SignatureError, UrlSigner};
pub use traits::{
    sha256_hex, validate_key, DeleteOutcome, ObjectStore, PutResult, StorageError,
};
