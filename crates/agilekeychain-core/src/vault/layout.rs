//! On-disk layout of an AgileKeychain vault.
//!
//! ```text
//! <root>/data/<profile>/encryptionKeys.js    generation 4 keys record (JSON)
//! <root>/data/<profile>/1password.keys       generation 3 keys record (property list)
//! <root>/data/<profile>/contents.js          item index
//! <root>/data/<profile>/<uuid>.1password     one JSON record per item
//! <root>/config/buildnum                     build marker
//! ```

use std::path::{Path, PathBuf};

/// Profile every vault ships with.
pub const DEFAULT_PROFILE: &str = "default";

pub const JSON_KEYS_FILE: &str = "encryptionKeys.js";
pub const PLIST_KEYS_FILE: &str = "1password.keys";
pub const CONTENTS_FILE: &str = "contents.js";
pub const ITEM_EXTENSION: &str = "1password";
pub const BUILD_NUMBER_FILE: &str = "buildnum";

/// Which keys record a vault carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysFormat {
    /// `encryptionKeys.js`, with PBKDF2 iteration counts.
    Json,
    /// `1password.keys`, NUL-laden XML property list.
    Plist,
}

impl KeysFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            KeysFormat::Json => JSON_KEYS_FILE,
            KeysFormat::Plist => PLIST_KEYS_FILE,
        }
    }
}

/// Resolves vault-relative paths for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultLayout {
    root: PathBuf,
    profile: String,
}

impl VaultLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            profile: DEFAULT_PROFILE.to_string(),
        }
    }

    /// Use a profile other than `default`.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data").join(&self.profile)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn keys_file(&self, format: KeysFormat) -> PathBuf {
        self.data_dir().join(format.file_name())
    }

    pub fn contents_file(&self) -> PathBuf {
        self.data_dir().join(CONTENTS_FILE)
    }

    pub fn build_number_file(&self) -> PathBuf {
        self.config_dir().join(BUILD_NUMBER_FILE)
    }

    /// Path of the record for item `uuid`, or `None` if the identifier could
    /// escape the data directory.
    pub fn item_file(&self, uuid: &str) -> Option<PathBuf> {
        if !is_safe_identifier(uuid) {
            return None;
        }
        Some(self.data_dir().join(format!("{uuid}.{ITEM_EXTENSION}")))
    }

    /// The keys record to read: JSON when present, property list otherwise.
    pub fn preferred_keys_format(&self) -> Option<KeysFormat> {
        [KeysFormat::Json, KeysFormat::Plist]
            .into_iter()
            .find(|format| self.keys_file(*format).is_file())
    }
}

fn is_safe_identifier(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}
