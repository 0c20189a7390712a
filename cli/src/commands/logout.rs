//! `relimg logout` command: remove stored credentials for a scope.

use clap::Args;
use relimg_runtime::CredentialStore;

#[derive(Args)]
pub struct LogoutArgs {
    /// Registry or repository prefix (default: docker.io)
    pub scope: Option<String>,
}

pub async fn execute(args: LogoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = CredentialStore::default_path()?;
    println!("{}", logout(args, &store)?);
    Ok(())
}

fn logout(args: LogoutArgs, store: &CredentialStore) -> relimg_core::Result<String> {
    let scope = args.scope.unwrap_or_else(|| "docker.io".to_string());
    Ok(if store.logout(&scope)? {
        format!("Removing login credentials for {}", scope)
    } else {
        format!("Not logged in to {}", scope)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relimg_runtime::{Credential, ImageReference};
    use tempfile::TempDir;

    #[test]
    fn test_logout_removes_only_its_scope() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.login("quay.io", Credential::new("everyone", "a")).unwrap();
        store.login("quay.io/example", Credential::new("robot", "b")).unwrap();

        let args = || LogoutArgs {
            scope: Some("quay.io/example".to_string()),
        };
        assert_eq!(
            logout(args(), &store).unwrap(),
            "Removing login credentials for quay.io/example"
        );
        assert_eq!(
            logout(args(), &store).unwrap(),
            "Not logged in to quay.io/example"
        );

        // The registry-wide login now covers the organization
        let identity = ImageReference::parse("quay.io/example/operator:v1")
            .unwrap()
            .identity();
        assert_eq!(
            store.lookup(&identity).unwrap(),
            Some(Credential::new("everyone", "a"))
        );
    }
}
