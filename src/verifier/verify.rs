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

//! Completion of a parsed signature: policy, key, body hash, and signature.

use crate::{
    canonicalize::canonicalize_body,
    crypto::{self, HashAlgorithm, KeyType, VerifyingKey},
    record::{DkimKeyRecord, DkimKeyRecordParseError},
    signature::{DkimSignature, DomainName, Identity},
    util::encode_base64,
    verifier::{query, Config, LookupTxt, PolicyError, VerifierError},
};
use std::io;
use tracing::trace;

/// What the completion of one signature arrived at.
#[derive(Debug, Default)]
pub struct Completion {
    pub outcome: Option<Result<(), VerifierError>>,
    pub key_record: Option<DkimKeyRecord>,
    pub key_size: Option<usize>,
    pub testing: bool,
}

impl Completion {
    fn failed(error: VerifierError) -> Self {
        Self {
            outcome: Some(Err(error)),
            ..Default::default()
        }
    }
}

pub async fn complete_signature<T: LookupTxt + ?Sized>(
    resolver: &T,
    config: &Config,
    sig: &DkimSignature,
    processed_header: &[u8],
    body: &[u8],
) -> Completion {
    if let Err(e) = check_policy(config, sig) {
        trace!(domain = %sig.domain, "signature rejected by policy: {e}");
        return Completion::failed(e);
    }

    let txts = match query::look_up_records(
        resolver,
        &sig.domain,
        &sig.selector,
        config.lookup_timeout,
    )
    .await
    {
        Ok(txts) => txts,
        Err(e) => return Completion::failed(e),
    };

    if let Err(e) = verify_body_hash(config, sig, body) {
        return Completion::failed(e);
    }

    let hash_alg = sig.algorithm.hash_algorithm();
    let data_hash = crypto::digest_slices(hash_alg, [processed_header]);

    let mut completion = Completion::default();

    // the last error seen is the one reported
    for (i, txt) in txts.into_iter().enumerate() {
        trace!("trying key record {}", i + 1);

        completion = verify_with_record(config, sig, txt, &data_hash);

        if matches!(completion.outcome, Some(Ok(()))) {
            break;
        }
    }

    completion
}

fn verify_with_record(
    config: &Config,
    sig: &DkimSignature,
    txt: io::Result<String>,
    data_hash: &[u8],
) -> Completion {
    let key_record = match txt {
        Ok(s) => match s.parse::<DkimKeyRecord>() {
            Ok(r) => r,
            Err(DkimKeyRecordParseError::RevokedKey) => {
                trace!("key revoked");
                return Completion::failed(VerifierError::KeyRevoked);
            }
            Err(e) => {
                trace!("invalid key record: {e}");
                return Completion::failed(VerifierError::KeyRecordSyntax);
            }
        },
        Err(e) => {
            trace!("unusable DNS record: {e}");
            return Completion::failed(VerifierError::KeyRecordSyntax);
        }
    };

    let key_type = sig.algorithm.key_type();
    let hash_alg = sig.algorithm.hash_algorithm();

    let user_id = sig.user_id.as_ref();
    if let Err(e) = validate_key_record(key_type, hash_alg, &key_record, &sig.domain, user_id) {
        return Completion::failed(e);
    }

    let testing = key_record.is_testing();

    let public_key = match VerifyingKey::from_key_data(key_type, &key_record.key_data) {
        Ok(k) => k,
        Err(e) => {
            trace!("unusable public key: {e}");
            return Completion {
                outcome: Some(Err(VerifierError::VerificationFailure(e))),
                key_record: Some(key_record),
                key_size: None,
                testing,
            };
        }
    };

    let key_size = public_key.key_size();

    let outcome = check_key_size(config, key_size).and_then(|_| {
        public_key
            .verify(hash_alg, data_hash, &sig.signature_data)
            .map_err(VerifierError::VerificationFailure)
    });

    match &outcome {
        Ok(()) => trace!(domain = %sig.domain, "signature verified"),
        Err(e) => trace!(domain = %sig.domain, "signature verification failed: {e}"),
    }

    Completion {
        outcome: Some(outcome),
        key_record: Some(key_record),
        key_size,
        testing,
    }
}

fn check_policy(config: &Config, sig: &DkimSignature) -> Result<(), VerifierError> {
    if config
        .required_signed_headers
        .iter()
        .any(|h| !sig.signed_headers.contains(h))
    {
        return Err(PolicyError::RequiredHeadersNotSigned.into());
    }

    #[cfg(feature = "pre-rfc8301")]
    if sig.algorithm.hash_algorithm() == HashAlgorithm::Sha1 && !config.allow_sha1 {
        return Err(PolicyError::DisallowedSha1Hash.into());
    }

    let now = config.current_timestamp();
    let tolerance = config.time_tolerance.as_secs();

    if config.fail_if_expired {
        if let Some(x) = sig.expiration {
            if now >= x.saturating_add(tolerance) {
                return Err(PolicyError::SignatureExpired.into());
            }
        }
    }

    if config.fail_if_in_future {
        if let Some(t) = sig.timestamp {
            if t.saturating_sub(tolerance) > now {
                return Err(PolicyError::TimestampInFuture.into());
            }
        }
    }

    Ok(())
}

fn check_key_size(config: &Config, key_size: Option<usize>) -> Result<(), VerifierError> {
    match key_size {
        Some(bits) if bits < config.min_key_bits.max(crypto::MIN_RSA_KEY_BITS) => {
            trace!(bits, "public key too small");
            Err(PolicyError::KeyTooSmall.into())
        }
        _ => Ok(()),
    }
}

// The l= count applies to the canonicalized body, RFC 6376, section 3.4.5.
fn verify_body_hash(
    config: &Config,
    sig: &DkimSignature,
    body: &[u8],
) -> Result<(), VerifierError> {
    let mut canonical_body = canonicalize_body(sig.canonicalization.body, body);

    if let Some(len) = sig.body_length {
        let len = usize::try_from(len).map_err(|_| VerifierError::Overflow)?;

        if len > canonical_body.len() {
            trace!(len, "body shorter than signed length");
            return Err(VerifierError::InsufficientBodyLength);
        }
        if len < canonical_body.len() && config.forbid_partially_signed_body {
            return Err(PolicyError::ForbidPartiallySignedBody.into());
        }

        canonical_body.truncate(len);
    }

    let hash = crypto::digest_slices(sig.algorithm.hash_algorithm(), [&canonical_body]);

    if *hash != *sig.body_hash {
        trace!(computed = %encode_base64(&hash), "body hash mismatch");
        return Err(VerifierError::BodyHashMismatch);
    }

    trace!("body hash matched");

    Ok(())
}

fn validate_key_record(
    key_type: KeyType,
    hash_alg: HashAlgorithm,
    record: &DkimKeyRecord,
    domain: &DomainName,
    user_id: Option<&Identity>,
) -> Result<(), VerifierError> {
    if record.key_type != key_type {
        trace!("wrong public key type");
        return Err(VerifierError::WrongKeyType);
    }
    if !record.hash_algorithms.contains(&hash_alg) {
        trace!("disallowed hash algorithm");
        return Err(VerifierError::DisallowedHashAlgorithm);
    }
    if !record.allows_email() {
        trace!("disallowed service type");
        return Err(VerifierError::DisallowedServiceType);
    }
    if record.forbids_subdomains() {
        // i= is already known to be within d=
        if let Some(user_id) = user_id {
            if user_id.domain_part != *domain {
                trace!("i= domain is a subdomain, not allowed by key record");
                return Err(VerifierError::DomainMismatch);
            }
        }
    }

    Ok(())
}
