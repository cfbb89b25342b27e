//! Custom domain ownership: challenge derivation and the DNS verification loop.
mod challenge;
pub use challenge::{CHALLENGE_PREFIX, DomainChallenge, RecordType, root_domain};

mod verify;
pub use verify::{DEFAULT_POLL_INTERVAL_MS, DnsResolver, Verified, Verifier, VerifyConfig};
