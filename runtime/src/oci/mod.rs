//! OCI image references and the registry side of digest resolution.
//!
//! ```text
//!   ImageReference (tag form)
//!          │
//!          ▼
//!   DigestResolver ──► ResolutionCache (run-scoped)
//!          │ miss
//!          ▼
//!   RegistryInspector ──► OciRegistryInspector ──► registry (oci-distribution)
//!                                  │
//!                                  └── CredentialStore / env credentials
//! ```

pub mod credentials;
pub mod reference;
pub mod registry;
pub mod resolver;

pub use credentials::{Credential, CredentialStore};
pub use reference::{Identity, ImageReference, ReferenceForm};
pub use registry::{IndexPolicy, InspectError, OciRegistryInspector, RegistryAuth, RegistryInspector};
pub use resolver::{DigestResolver, ResolutionFailure, ResolutionReport};
