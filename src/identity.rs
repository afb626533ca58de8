//! Stable client identity, kept in `<data_dir>/identity.toml`.

use gridsync_sync::Identity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::data_dir;
use crate::error::{GridsyncError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct IdentityFile {
    user_id: String,
    user_name: String,
}

pub fn default_identity_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("identity.toml"))
}

/// A fresh random identity named `User-<first 4 chars of id>`.
pub fn generate_identity() -> Identity {
    let user_id = Uuid::new_v4().to_string();
    let user_name = format!("User-{}", &user_id[..4]);
    Identity { user_id, user_name }
}

fn read_identity(path: &Path) -> Result<Identity> {
    let content = std::fs::read_to_string(path)?;
    let file: IdentityFile = toml::from_str(&content).map_err(|source| GridsyncError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    if file.user_id.trim().is_empty() {
        return Err(GridsyncError::Parse(format!(
            "{}: empty user_id",
            path.display()
        )));
    }
    Ok(Identity {
        user_id: file.user_id,
        user_name: file.user_name,
    })
}

fn write_identity(path: &Path, identity: &Identity) -> Result<()> {
    let file = IdentityFile {
        user_id: identity.user_id.clone(),
        user_name: identity.user_name.clone(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string(&file)?)?;
    Ok(())
}

/// Reuse the identity stored at `path`, or create and store a new one.
///
/// Failures fall back to a fresh identity and are returned as warnings.
pub fn load_or_create_identity(path: Option<&Path>) -> (Identity, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(path) = path else {
        return (generate_identity(), warnings);
    };

    if path.exists() {
        match read_identity(path) {
            Ok(identity) => return (identity, warnings),
            Err(err) => warnings.push(format!("Ignoring identity file: {}", err)),
        }
    }

    let identity = generate_identity();
    if let Err(err) = write_identity(path, &identity) {
        warnings.push(format!("Failed to save identity to {}: {}", path.display(), err));
    }
    (identity, warnings)
}

/// Persist a changed display name. Used after `:name`.
pub fn save_identity(path: Option<&Path>, identity: &Identity) -> Result<()> {
    match path {
        Some(path) => write_identity(path, identity),
        None => Ok(()),
    }
}
