//! `relimg login` command: store credentials used for digest lookups.
//!
//! The scope is a registry (`quay.io`) or a repository prefix
//! (`quay.io/example`); lookups use the most specific scope covering an image.

use std::io::{BufRead, Write};

use clap::Args;
use relimg_runtime::{Credential, CredentialStore};

#[derive(Args)]
pub struct LoginArgs {
    /// Registry or repository prefix (default: docker.io)
    pub scope: Option<String>,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

pub async fn execute(args: LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = CredentialStore::default_path()?;
    let stdin = std::io::stdin();
    run(args, &store, &mut stdin.lock(), &mut std::io::stdout())
}

fn run<R: BufRead, W: Write>(
    args: LoginArgs,
    store: &CredentialStore,
    input: &mut R,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = args.scope.unwrap_or_else(|| "docker.io".to_string());

    let username = match args.username {
        Some(u) => u,
        None => {
            eprint!("Username: ");
            read_line(input)?
        }
    };

    let password = if args.password_stdin {
        read_line(input)?
    } else {
        match args.password {
            Some(p) => p,
            None => {
                eprint!("Password: ");
                read_line(input)?
            }
        }
    };

    if username.is_empty() || password.is_empty() {
        return Err("Username and password are required".into());
    }

    let scope = store.login(&scope, Credential::new(username, password))?;
    tracing::debug!(scope = %scope, path = %store.path().display(), "Stored credentials");

    writeln!(out, "Login Succeeded for {}", scope)?;
    Ok(())
}

fn read_line<R: BufRead>(input: &mut R) -> std::io::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("credentials.json"))
    }

    fn credential_for(store: &CredentialStore, image: &str) -> Option<Credential> {
        let identity = relimg_runtime::ImageReference::parse(image).unwrap().identity();
        store.lookup(&identity).unwrap()
    }

    #[test]
    fn test_login_with_flags() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let args = LoginArgs {
            scope: Some("quay.io/Example".to_string()),
            username: Some("robot".to_string()),
            password: Some("s3cret".to_string()),
            password_stdin: false,
        };
        let mut out = Vec::new();
        run(args, &store, &mut std::io::empty(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Login Succeeded for quay.io/example\n"
        );
        assert_eq!(
            credential_for(&store, "quay.io/example/operator:v1"),
            Some(Credential::new("robot", "s3cret"))
        );
        assert_eq!(credential_for(&store, "quay.io/other/operator:v1"), None);
    }

    #[test]
    fn test_login_password_stdin_default_scope() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let args = LoginArgs {
            scope: None,
            username: Some("user".to_string()),
            password: None,
            password_stdin: true,
        };
        let mut input: &[u8] = b"from-stdin\n";
        run(args, &store, &mut input, &mut Vec::new()).unwrap();
        assert_eq!(
            credential_for(&store, "memcached:1.4.36-alpine"),
            Some(Credential::new("user", "from-stdin"))
        );
    }

    #[test]
    fn test_login_requires_password() {
        let dir = TempDir::new().unwrap();
        let args = LoginArgs {
            scope: None,
            username: Some("user".to_string()),
            password: None,
            password_stdin: true,
        };
        let mut input: &[u8] = b"\n";
        assert!(run(args, &store(&dir), &mut input, &mut Vec::new()).is_err());
    }
}
