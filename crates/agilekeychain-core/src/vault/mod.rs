//! Vault directory access: keys records, items and the contents index.

pub mod data_source;
pub mod encryption_key;
pub mod error;
pub mod item;
pub mod layout;
pub mod records;
pub mod repository;

pub use data_source::{
    BUILD_NUMBER, DEFAULT_ITERATIONS, DataSource, FAST_ITERATIONS, FAST_KDF_ENV, default_iterations,
    new_identifier,
};
pub use encryption_key::{EncryptionKey, SecurityLevel};
pub use error::VaultError;
pub use item::{DecryptionError, ItemContents, ItemError, ItemPayload, KeychainItem};
pub use layout::{KeysFormat, VaultLayout};
pub use records::{ContentsEntry, ItemMetadata, ItemRecord, KeyRecord, KeysRecord};
pub use repository::{Repository, VaultReader};
