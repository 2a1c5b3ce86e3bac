// dkim-parse – extraction and verification of DKIM signatures
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Hashing and signature verification primitives.
//!
//! Public keys published in DNS come in two encodings for each key type. RSA
//! keys are read as SubjectPublicKeyInfo first and as bare RSAPublicKey
//! second; the first is what signers actually publish, although RFC 6376
//! names the second. Ed25519 keys are read as the 32 raw key bytes of RFC 8463
//! first and as SubjectPublicKeyInfo (the OpenSSL default output) second.

mod ed25519;
mod hash;
mod rsa;

pub use self::{
    ed25519::{read_ed25519_verifying_key, verify_ed25519},
    hash::digest_slices,
    rsa::{read_rsa_public_key, rsa_public_key_size, verify_rsa},
};

use crate::util::CanonicalStr;
use ::rsa::RsaPublicKey;
use ed25519_dalek::VerifyingKey as Ed25519VerifyingKey;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// The smallest RSA key accepted under any configuration.
#[cfg(not(feature = "pre-rfc8301"))]
pub const MIN_RSA_KEY_BITS: usize = 1024;
#[cfg(feature = "pre-rfc8301")]
pub const MIN_RSA_KEY_BITS: usize = 512;

/// A key type, as named in the k= tag of a key record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyType {
    Rsa,
    Ed25519,
}

impl CanonicalStr for KeyType {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// A hash algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HashAlgorithm {
    Sha256,
    #[cfg(feature = "pre-rfc8301")]
    Sha1,
}

impl CanonicalStr for HashAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            #[cfg(feature = "pre-rfc8301")]
            Self::Sha1 => "sha1",
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// A public key ready for verification.
#[derive(Debug)]
pub enum VerifyingKey {
    Rsa(RsaPublicKey),
    Ed25519(Ed25519VerifyingKey),
}

impl VerifyingKey {
    /// Decodes key data from the p= tag of a key record.
    pub fn from_key_data(key_type: KeyType, key_data: &[u8]) -> Result<Self, VerificationError> {
        match key_type {
            KeyType::Rsa => read_rsa_public_key(key_data).map(Self::Rsa),
            KeyType::Ed25519 => read_ed25519_verifying_key(key_data).map(Self::Ed25519),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Ed25519(_) => KeyType::Ed25519,
        }
    }

    /// The modulus size in bits, for RSA keys.
    pub fn key_size(&self) -> Option<usize> {
        match self {
            Self::Rsa(public_key) => Some(rsa_public_key_size(public_key)),
            Self::Ed25519(_) => None,
        }
    }

    /// Verifies `signature_data` over the already computed `data_hash`.
    pub fn verify(
        &self,
        hash_alg: HashAlgorithm,
        data_hash: &[u8],
        signature_data: &[u8],
    ) -> Result<(), VerificationError> {
        match self {
            Self::Rsa(public_key) => verify_rsa(hash_alg, public_key, data_hash, signature_data),
            Self::Ed25519(verifying_key) => verify_ed25519(verifying_key, data_hash, signature_data),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VerificationError {
    InvalidKey,
    InsufficientKeySize,
    InvalidSignature,
    VerificationFailure,
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key data"),
            Self::InsufficientKeySize => write!(f, "key too small"),
            Self::InvalidSignature => write!(f, "invalid signature data"),
            Self::VerificationFailure => write!(f, "signature verification failed"),
        }
    }
}

impl Error for VerificationError {}
