//! Delegated signing.
//!
//! A long-lived offline master key signs a subordinate signing key together
//! with an expiration date, producing a [`DelegatedKey`]. The subordinate key
//! then signs records; every [`DelegatedSignature`] carries its delegation
//! envelope, so verifiers only ever need the master public key.
//!
//! Wire layout (all lengths fixed):
//!
//! ```text
//! DelegatedKey (168 bytes):
//!     master public key (32) || sub public key (32) ||
//!     not-after (8, little-endian unsigned unix seconds, all-zero = never) ||
//!     ed25519 signature (64) by the master key over the first 72 bytes
//!
//! DelegatedSignature (232 bytes):
//!     DelegatedKey (168) || ed25519 signature (64) by the sub key
//! ```

use {
    base64::{engine::general_purpose::STANDARD, Engine as _},
    chrono::{DateTime, Utc},
    ed25519_dalek::{
        Signature,
        Signer as _,
        SigningKey,
        VerifyingKey,
        PUBLIC_KEY_LENGTH,
        SIGNATURE_LENGTH,
    },
    subtle::ConstantTimeEq as _,
    thiserror::Error,
};

const TIME_LENGTH: usize = 8;

const MASTER_KEY_START: usize = 0;
const SUB_KEY_START: usize = MASTER_KEY_START + PUBLIC_KEY_LENGTH;
const NOT_AFTER_START: usize = SUB_KEY_START + PUBLIC_KEY_LENGTH;
const HEADER_LENGTH: usize = NOT_AFTER_START + TIME_LENGTH;
const SIGNATURE_START: usize = HEADER_LENGTH;

/// Length in bytes of a serialized [`DelegatedKey`].
pub const DELEGATED_KEY_LENGTH: usize = HEADER_LENGTH + SIGNATURE_LENGTH;
/// Length in bytes of a serialized [`DelegatedSignature`].
pub const DELEGATED_SIGNATURE_LENGTH: usize = DELEGATED_KEY_LENGTH + SIGNATURE_LENGTH;

/// Errors raised while decoding or verifying delegations.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DelegationError {
    /// The byte layout is wrong (bad length or undecodable field).
    #[error("invalid delegated key format")]
    Format,
    /// The delegation carries a not-after date that has passed.
    #[error("expired delegation")]
    Expired,
    /// A signature did not verify, or an embedded key is not a valid point.
    #[error("delegation signature invalid")]
    Signature,
}

/// A sub public key bound to a master key with an expiry, signed by the
/// master private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegatedKey([u8; DELEGATED_KEY_LENGTH]);

impl DelegatedKey {
    /// Create a delegation from `master` to `sub`. `not_after` bounds the
    /// lifetime of the delegation; `None` means it never expires.
    pub fn delegate(
        master: &SigningKey,
        sub: &VerifyingKey,
        not_after: Option<DateTime<Utc>>,
    ) -> Self {
        let mut key = [0u8; DELEGATED_KEY_LENGTH];
        key[MASTER_KEY_START..SUB_KEY_START]
            .copy_from_slice(&master.verifying_key().to_bytes());
        key[SUB_KEY_START..NOT_AFTER_START].copy_from_slice(&sub.to_bytes());
        if let Some(t) = not_after {
            let secs = t.timestamp() as u64;
            key[NOT_AFTER_START..HEADER_LENGTH].copy_from_slice(&secs.to_le_bytes());
        }
        let sig: Signature = master.sign(&key[..HEADER_LENGTH]);
        key[SIGNATURE_START..].copy_from_slice(&sig.to_bytes());
        Self(key)
    }

    /// Decode a delegated key from raw bytes. Only the length is checked;
    /// use [`DelegatedKey::contents`] for verification.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DelegationError> {
        let bytes: [u8; DELEGATED_KEY_LENGTH] =
            data.try_into().map_err(|_| DelegationError::Format)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DELEGATED_KEY_LENGTH] {
        &self.0
    }

    /// Return the embedded master public key bytes without any verification.
    pub fn delegator(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0[MASTER_KEY_START..SUB_KEY_START]
            .try_into()
            .expect("fixed layout")
    }

    /// Raw not-after seconds, reinterpreted as signed like the wire format
    /// prescribes. Zero means "never expires".
    fn not_after_secs(&self) -> i64 {
        let bytes: [u8; TIME_LENGTH] = self.0[NOT_AFTER_START..HEADER_LENGTH]
            .try_into()
            .expect("fixed layout");
        u64::from_le_bytes(bytes) as i64
    }

    /// Check the not-after field against `now`. Does NOT verify the
    /// delegation signature.
    fn check_expiry(&self, now: DateTime<Utc>) -> Result<(), DelegationError> {
        let secs = self.not_after_secs();
        if secs != 0 && secs < now.timestamp() {
            return Err(DelegationError::Expired);
        }
        Ok(())
    }

    /// Verify the delegation and return the embedded master key, sub key and
    /// expiry. Expiry is checked before the signature, so a stale delegation
    /// reports [`DelegationError::Expired`] even when otherwise intact.
    pub fn contents(
        &self,
    ) -> Result<(VerifyingKey, VerifyingKey, Option<DateTime<Utc>>), DelegationError> {
        self.contents_at(Utc::now())
    }

    pub(crate) fn contents_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(VerifyingKey, VerifyingKey, Option<DateTime<Utc>>), DelegationError> {
        self.check_expiry(now)?;
        let master = VerifyingKey::from_bytes(self.delegator())
            .map_err(|_| DelegationError::Signature)?;
        let sig = Signature::from_bytes(
            self.0[SIGNATURE_START..].try_into().expect("fixed layout"),
        );
        master
            .verify_strict(&self.0[..HEADER_LENGTH], &sig)
            .map_err(|_| DelegationError::Signature)?;
        let sub_bytes: [u8; PUBLIC_KEY_LENGTH] = self.0[SUB_KEY_START..NOT_AFTER_START]
            .try_into()
            .expect("fixed layout");
        let sub =
            VerifyingKey::from_bytes(&sub_bytes).map_err(|_| DelegationError::Signature)?;
        let until = match self.not_after_secs() {
            0 => None,
            secs => Some(DateTime::from_timestamp(secs, 0).ok_or(DelegationError::Format)?),
        };
        Ok((master, sub, until))
    }

    /// Verify the delegation and return `(master, sub)`.
    pub fn keys(&self) -> Result<(VerifyingKey, VerifyingKey), DelegationError> {
        let (master, sub, _) = self.contents()?;
        Ok((master, sub))
    }

    /// Sign `msg` with the delegated private key, embedding this delegation
    /// in the result.
    pub fn sign(&self, sub_private: &SigningKey, msg: &[u8]) -> DelegatedSignature {
        let sig: Signature = sub_private.sign(msg);
        let mut out = [0u8; DELEGATED_SIGNATURE_LENGTH];
        out[..DELEGATED_KEY_LENGTH].copy_from_slice(&self.0);
        out[DELEGATED_KEY_LENGTH..].copy_from_slice(&sig.to_bytes());
        DelegatedSignature(out)
    }
}

/// A signature by a delegated key, carrying its delegation envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegatedSignature([u8; DELEGATED_SIGNATURE_LENGTH]);

impl DelegatedSignature {
    pub fn from_bytes(data: &[u8]) -> Result<Self, DelegationError> {
        let bytes: [u8; DELEGATED_SIGNATURE_LENGTH] =
            data.try_into().map_err(|_| DelegationError::Format)?;
        Ok(Self(bytes))
    }

    /// Decode from standard padded base64, the encoding used on record lines.
    pub fn from_base64(data: &str) -> Result<Self, DelegationError> {
        let raw = STANDARD.decode(data).map_err(|_| DelegationError::Format)?;
        Self::from_bytes(&raw)
    }

    pub fn as_bytes(&self) -> &[u8; DELEGATED_SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Return the embedded delegation envelope without verifying it.
    pub fn delegated_key(&self) -> DelegatedKey {
        let bytes: [u8; DELEGATED_KEY_LENGTH] = self.0[..DELEGATED_KEY_LENGTH]
            .try_into()
            .expect("fixed layout");
        DelegatedKey(bytes)
    }

    /// Verify that this is a valid delegated signature over `msg` rooted in
    /// `master`. Returns the sub public key on success, `None` on any
    /// failure. The embedded master key is compared in constant time so the
    /// acceptance check leaks no timing.
    pub fn verify(&self, master: &[u8; PUBLIC_KEY_LENGTH], msg: &[u8]) -> Option<VerifyingKey> {
        let delegated = self.delegated_key();
        if !bool::from(delegated.delegator()[..].ct_eq(&master[..])) {
            return None;
        }
        let Ok((_, sub)) = delegated.keys() else {
            return None;
        };
        let sig = Signature::from_bytes(
            self.0[DELEGATED_KEY_LENGTH..]
                .try_into()
                .expect("fixed layout"),
        );
        sub.verify_strict(msg, &sig).ok().map(|_| sub)
    }
}
