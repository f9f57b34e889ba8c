//! Keywarden SDK.
//!
//! Keywarden is an access-control plane for SSH public-key authentication. A
//! central administrator declares which organizational users may access which
//! system accounts on which hosts; the model is compiled into signed
//! authorization records that host-side agents feed to `sshd` through its
//! `AuthorizedKeysCommand` hook.
//!
//! The SDK is organized around the security-critical path:
//! - [`delegation`]: the delegated-signature scheme binding a short-lived
//!   signing key to an offline master key.
//! - [`model`]: compilation of the declarative YAML model into signed record
//!   files fanned out over a directory tree.
//! - [`acl`]: host-side resolution of `(host, user, fingerprint)` queries
//!   against a remote endpoint or a trusted local file.
//! - [`sshkey`], [`hostmatch`], [`duration`], [`fileperm`], [`keyfile`]:
//!   the supporting parsers and guards used by both sides.

pub mod acl;
pub mod delegation;
pub mod duration;
pub mod fileperm;
pub mod hostmatch;
pub mod keyfile;
pub mod model;
pub mod sshkey;

/// URL and directory segment for per-key record lookups.
pub const PER_KEY_PATH: &str = "key";
/// URL and directory segment for per-host record bundles.
pub const PER_HOST_PATH: &str = "host";
