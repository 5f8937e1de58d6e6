//! Read/write engine for AgileKeychain password vaults.
//!
//! ```no_run
//! use agilekeychain_core::{DataSource, Keychain};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = DataSource::new("/path/to/1Password.agilekeychain");
//! let mut keychain = Keychain::new(&source);
//! keychain.unlock("password")?;
//!
//! let mut item = keychain.get_item_by_unique_id("2E21D652E0754BD59F6B94B0323D0142")?;
//! let key = source
//!     .repository()
//!     .key_by_identifier(item.key_identifier())?
//!     .ok_or("item refers to an unknown key")?;
//! item.decrypt(&key.decrypt(b"password")?)?;
//! println!("{:?}", item.payload());
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod keychain;
pub mod vault;

pub use crypto::MasterKey;
pub use keychain::{Keychain, LockState};
pub use vault::{DataSource, EncryptionKey, KeychainItem, Repository, SecurityLevel, VaultReader};
