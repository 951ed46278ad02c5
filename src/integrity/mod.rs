pub mod canonical;
pub mod hash;
pub mod register;
pub mod verify;

use crate::{CanonicalIdentifier, ContentDigest, Result};

pub use canonical::canonicalize;
pub use hash::digest;
pub use register::{Registrar, Registration};
pub use verify::{ExpectedSource, Verdict, VerificationReport, Verifier};

/// Canonicalize a file reference and hash the result.
pub fn fingerprint(file_reference: &str) -> Result<(CanonicalIdentifier, ContentDigest)> {
    let canonical = canonicalize(file_reference)?;
    let digest = digest(canonical.as_str())?;
    Ok((canonical, digest))
}
