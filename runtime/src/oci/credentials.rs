//! Registry credentials scoped to a registry or a repository prefix.
//!
//! A scope is `registry` or `registry/namespace[/...]`, e.g. `quay.io` or
//! `quay.io/example`. An image uses the most specific scope that covers its
//! identity, so a per-organization robot account can sit next to a
//! registry-wide login. Credentials are handed to the registry client as is.
//!
//! Stored at `~/.relimg/auth/credentials.json`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use relimg_core::error::{RelimgError, Result};
use serde::{Deserialize, Serialize};

use super::reference::Identity;
use crate::manifest::io::write_atomic;

/// Username and password for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    scopes: BTreeMap<String, Credential>,
}

/// Scoped credentials backed by a JSON file.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store at `~/.relimg/auth/credentials.json`.
    pub fn default_path() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            RelimgError::ConfigError("cannot determine home directory for credentials".to_string())
        })?;
        Ok(Self::new(home.join(".relimg").join("auth").join("credentials.json")))
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save credentials for `scope`, replacing earlier ones.
    /// Returns the normalized scope they were saved under.
    pub fn login(&self, scope: &str, credential: Credential) -> Result<String> {
        let scope = normalize_scope(scope)?;
        let mut file = self.read()?;
        file.scopes.insert(scope.clone(), credential);
        self.write(&file)?;
        Ok(scope)
    }

    /// Forget the credentials for `scope`. Returns false when there were none.
    pub fn logout(&self, scope: &str) -> Result<bool> {
        let scope = normalize_scope(scope)?;
        let mut file = self.read()?;
        if file.scopes.remove(&scope).is_none() {
            return Ok(false);
        }
        self.write(&file)?;
        Ok(true)
    }

    /// Credentials for an image: the most specific scope covering `identity`.
    pub fn lookup(&self, identity: &Identity) -> Result<Option<Credential>> {
        let file = self.read()?;
        for scope in covering_scopes(identity) {
            if let Some(credential) = file.scopes.get(&scope) {
                tracing::debug!(image = %identity, scope = %scope, "Using stored credentials");
                return Ok(Some(credential.clone()));
            }
        }
        Ok(None)
    }

    fn read(&self) -> Result<CredentialFile> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CredentialFile::default()),
            Err(e) => {
                return Err(RelimgError::ConfigError(format!(
                    "cannot read credentials {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&data).map_err(|e| {
            RelimgError::ConfigError(format!(
                "invalid credentials file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write(&self, file: &CredentialFile) -> Result<()> {
        write_atomic(&self.path, serde_json::to_string_pretty(file)?.as_bytes())
    }
}

/// Scopes covering `identity`, most specific first:
/// `quay.io/org/app`, `quay.io/org`, `quay.io`.
fn covering_scopes(identity: &Identity) -> Vec<String> {
    let mut scopes = vec![identity.registry.clone()];
    let mut prefix = identity.registry.clone();
    for segment in identity.repository.split('/') {
        prefix.push('/');
        prefix.push_str(segment);
        scopes.push(prefix.clone());
    }
    scopes.reverse();
    scopes
}

/// Canonical form of a scope typed by a user.
///
/// Drops a URL scheme and trailing slashes, lowercases it and folds
/// Docker Hub's alias hosts (and their `/v1`, `/v2` API paths) into `docker.io`.
pub fn normalize_scope(scope: &str) -> Result<String> {
    let invalid = || RelimgError::ConfigError(format!("invalid registry scope '{}'", scope));

    let lowered = scope.trim().to_lowercase();
    let trimmed = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(lowered.as_str())
        .trim_end_matches('/');
    let (host, path) = match trimmed.split_once('/') {
        Some((host, path)) => (host, Some(path)),
        None => (trimmed, None),
    };
    if host.is_empty() || path.is_some_and(|p| p.split('/').any(str::is_empty)) {
        return Err(invalid());
    }

    let docker_hub = matches!(host, "docker.io" | "index.docker.io" | "registry-1.docker.io");
    Ok(match (docker_hub, path) {
        (true, None | Some("v1") | Some("v2")) => "docker.io".to_string(),
        (true, Some(path)) => format!("docker.io/{}", path),
        (false, Some(path)) => format!("{}/{}", host, path),
        (false, None) => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::ImageReference;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("credentials.json"))
    }

    fn identity(image: &str) -> Identity {
        ImageReference::parse(image).unwrap().identity()
    }

    #[test]
    fn test_normalize_scope() {
        assert_eq!(normalize_scope("Quay.IO").unwrap(), "quay.io");
        assert_eq!(normalize_scope("https://quay.io/Example/").unwrap(), "quay.io/example");
        assert_eq!(normalize_scope("https://index.docker.io/v1/").unwrap(), "docker.io");
        assert_eq!(normalize_scope("registry-1.docker.io").unwrap(), "docker.io");
        assert_eq!(normalize_scope("index.docker.io/myuser").unwrap(), "docker.io/myuser");
        assert!(normalize_scope("").is_err());
        assert!(normalize_scope("quay.io//org").is_err());
    }

    #[test]
    fn test_most_specific_scope_wins() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.login("quay.io", Credential::new("everyone", "a")).unwrap();
        store.login("quay.io/example", Credential::new("robot", "b")).unwrap();

        let found = |image: &str| store.lookup(&identity(image)).unwrap().map(|c| c.username);
        assert_eq!(found("quay.io/example/operator:v1").as_deref(), Some("robot"));
        assert_eq!(found("quay.io/other/app:v1").as_deref(), Some("everyone"));
        // Prefix matching is per path segment
        assert_eq!(found("quay.io/example-two/app:v1").as_deref(), Some("everyone"));
        assert_eq!(found("ghcr.io/example/app:v1"), None);
    }

    #[test]
    fn test_docker_hub_login_covers_short_names() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let scope = store
            .login("https://index.docker.io/v1/", Credential::new("user", "pass"))
            .unwrap();
        assert_eq!(scope, "docker.io");
        assert_eq!(
            store.lookup(&identity("memcached:1.4.36-alpine")).unwrap(),
            Some(Credential::new("user", "pass"))
        );
    }

    #[test]
    fn test_login_replaces_and_logout_removes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("credentials.json");
        let store = CredentialStore::new(path.clone());
        store.login("ghcr.io", Credential::new("user1", "pass1")).unwrap();
        store.login("GHCR.io", Credential::new("user2", "pass2")).unwrap();

        // A second instance sees the persisted entry
        let reopened = CredentialStore::new(path.clone());
        assert_eq!(
            reopened.lookup(&identity("ghcr.io/org/app:v1")).unwrap(),
            Some(Credential::new("user2", "pass2"))
        );
        assert!(!path.with_extension("relimg.tmp").exists());

        assert!(reopened.logout("ghcr.io").unwrap());
        assert!(!reopened.logout("ghcr.io").unwrap());
        assert_eq!(reopened.lookup(&identity("ghcr.io/org/app:v1")).unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(
            store.lookup(&identity("quay.io/org/app:v1")),
            Err(RelimgError::ConfigError(_))
        ));
    }
}
