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

//! Verifier and supporting types.

mod locate;
mod lookup;
mod pipeline;
mod query;
mod verify;

pub use self::{
    locate::{
        filter_signature_headers, find_signature_headers, isolate_signatures, SignatureHeaderSet,
    },
    lookup::LookupTxt,
    pipeline::process_header_set,
    query::key_record_name,
};

use crate::{
    crypto::VerificationError,
    header::FieldName,
    message::{MessageError, RawMessage},
    record::DkimKeyRecord,
    signature::{DkimSignature, DkimSignatureError, DkimSignatureParser, ParseSignature},
    util::CanonicalStr,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    time::{Duration, SystemTime},
};
use tracing::trace;

/// Configuration for a verifier process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum duration of public key record lookups. When this duration is
    /// exceeded evaluation fails (temporary error).
    pub lookup_timeout: Duration,

    /// Only process at most this number of signatures. Extra signatures still
    /// receive a result, which fails with [`VerifierError::TooManySignatures`].
    pub max_signatures: usize,

    /// If given required headers are not signed in a DKIM signature, the
    /// signature will not validate. Note that the header `From` is always
    /// required independent of this configuration setting.
    pub required_signed_headers: Vec<FieldName>,

    /// Minimum acceptable key size in bits. When the key size of an RSA public
    /// key is below this limit, the signature will not validate.
    ///
    /// There is also a compile-time hard lower bound, 1024 by default and 512
    /// with feature `pre-rfc8301`.
    pub min_key_bits: usize,

    /// When this flag is set, signatures using the SHA-1 hash algorithm are
    /// acceptable. Only effective with feature `pre-rfc8301`.
    pub allow_sha1: bool,

    /// If a DKIM signature has the l= tag, and the body length given in this
    /// tag is less than the canonicalized body length, the signature will not
    /// validate.
    pub forbid_partially_signed_body: bool,

    /// When this flag is set, an expired DKIM signature (x=) will not validate.
    pub fail_if_expired: bool,

    /// When this flag is set, a DKIM signature with a timestamp in the future
    /// (t=) will not validate.
    pub fail_if_in_future: bool,

    /// Tolerance applied to time values when checking signature expiration or
    /// timestamp validity, to allow for clock drift. Resolution is in seconds.
    pub time_tolerance: Duration,

    /// The `SystemTime` value to use as the instant ‘now’.
    pub fixed_system_time: Option<SystemTime>,
}

impl Config {
    fn current_timestamp(&self) -> u64 {
        self.fixed_system_time
            .unwrap_or_else(SystemTime::now)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(10),
            max_signatures: 10,
            required_signed_headers: vec![],
            min_key_bits: 1024,
            allow_sha1: false,
            forbid_partially_signed_body: false,
            fail_if_expired: true,
            fail_if_in_future: true,
            time_tolerance: Duration::from_secs(30),
            fixed_system_time: None,
        }
    }
}

/// The verdict for one signature.
///
/// `None` is the state of a result that has not been through key resolution
/// and cryptographic verification yet. Results returned from
/// [`Verifier::verify_message`] never have this status.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum DkimStatus {
    #[default]
    None,
    Ok,
    TempFail,
    PermFail,
}

impl CanonicalStr for DkimStatus {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Ok => "OK",
            Self::TempFail => "TEMPFAIL",
            Self::PermFail => "PERMFAIL",
        }
    }
}

impl Display for DkimStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PolicyError {
    RequiredHeadersNotSigned,
    ForbidPartiallySignedBody,
    SignatureExpired,
    TimestampInFuture,
    DisallowedSha1Hash,
    KeyTooSmall,
}

impl Display for PolicyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredHeadersNotSigned => write!(f, "headers required to be signed were not signed"),
            Self::ForbidPartiallySignedBody => write!(f, "partial body signing not acceptable"),
            Self::SignatureExpired => write!(f, "signature expired"),
            Self::TimestampInFuture => write!(f, "timestamp in future"),
            Self::DisallowedSha1Hash => write!(f, "hash algorithm SHA-1 not acceptable"),
            Self::KeyTooSmall => write!(f, "public key size too small"),
        }
    }
}

impl Error for PolicyError {}

/// The cause of a failed signature verification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VerifierError {
    /// The header set under evaluation does not start with a signature header.
    MissingSignatureHeader,
    SignatureFormat(DkimSignatureError),
    TooManySignatures,
    Overflow,
    WrongKeyType,
    KeyRecordSyntax,
    KeyRevoked,
    DisallowedHashAlgorithm,
    DisallowedServiceType,
    DomainMismatch,
    VerificationFailure(VerificationError),
    BodyHashMismatch,
    InsufficientBodyLength,
    NoKeyFound,
    InvalidKeyDomain,
    KeyLookupTimeout,
    KeyLookup,
    Policy(PolicyError),
}

impl VerifierError {
    /// The status a result failing with this error receives.
    ///
    /// Only key lookup problems are temporary, all other failures are
    /// permanent.
    pub fn status(&self) -> DkimStatus {
        match self {
            Self::KeyLookupTimeout | Self::KeyLookup => DkimStatus::TempFail,
            _ => DkimStatus::PermFail,
        }
    }
}

impl Display for VerifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignatureHeader => write!(f, "Missing DKIM-Signature"),
            Self::SignatureFormat(error) => error.fmt(f),
            Self::TooManySignatures => write!(f, "too many signatures"),
            Self::Overflow => write!(f, "integer size too large"),
            Self::WrongKeyType => write!(f, "wrong key type"),
            Self::KeyRecordSyntax => write!(f, "invalid syntax in key record"),
            Self::KeyRevoked => write!(f, "key in key record revoked"),
            Self::DisallowedHashAlgorithm => write!(f, "hash algorithm not allowed"),
            Self::DisallowedServiceType => write!(f, "service type not allowed"),
            Self::DomainMismatch => write!(f, "domain mismatch"),
            Self::VerificationFailure(error) => error.fmt(f),
            Self::BodyHashMismatch => write!(f, "body hash mismatch"),
            Self::InsufficientBodyLength => write!(f, "truncated body"),
            Self::NoKeyFound => write!(f, "no key record found"),
            Self::InvalidKeyDomain => write!(f, "invalid key record domain name"),
            Self::KeyLookupTimeout => write!(f, "key record lookup timed out"),
            Self::KeyLookup => write!(f, "key record lookup failed"),
            Self::Policy(error) => error.fmt(f),
        }
    }
}

impl Error for VerifierError {}

impl From<PolicyError> for VerifierError {
    fn from(error: PolicyError) -> Self {
        Self::Policy(error)
    }
}

/// A verification result arrived at for one signature header.
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationResult {
    /// Whether the signature verified; `true` exactly when `status` is OK.
    pub verified: bool,
    pub status: DkimStatus,
    /// The failure cause, present when `status` is TEMPFAIL or PERMFAIL.
    pub error: Option<VerifierError>,
    /// The index of the evaluated signature header in the segmented header
    /// fields of the message.
    pub index: usize,
    /// The parsed signature, if parsing got that far.
    pub signature: Option<DkimSignature>,
    /// The public key record used in the verification, if one was found.
    pub key_record: Option<DkimKeyRecord>,
    /// The canonicalized header data that is hashed and signed.
    pub processed_header: Option<Box<[u8]>>,
    /// The raw body, truncated to the length in the l= tag.
    pub signed_body: Option<Box<[u8]>>,
    /// Whether the key record was flagged as testing (t=y).
    pub testing: bool,
    /// The public key size in bits, for RSA keys.
    pub key_size: Option<usize>,
}

impl VerificationResult {
    fn new(index: usize) -> Self {
        Self {
            verified: false,
            status: DkimStatus::None,
            error: None,
            index,
            signature: None,
            key_record: None,
            processed_header: None,
            signed_body: None,
            testing: false,
            key_size: None,
        }
    }

    fn fail(&mut self, error: VerifierError) {
        self.verified = false;
        self.status = error.status();
        self.error = Some(error);
    }

    fn succeed(&mut self) {
        self.verified = true;
        self.status = DkimStatus::Ok;
        self.error = None;
    }
}

/// A verifier of the DKIM signatures in an email message.
///
/// Verification proceeds in two stages. First every signature header is
/// located and given its own isolated header set, and each set is parsed and
/// canonicalized ([`parse_message`][Verifier::parse_message]). Then, one
/// signature after the other, the public key is resolved and the signature
/// verified ([`verify_message`][Verifier::verify_message]).
///
/// # Examples
///
/// ```
/// use dkim_parse::{Config, DkimStatus, Verifier};
///
/// let message = b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=sel;\r\n\
///     \th=From:Subject; bh=YQ==; b=YWJj\r\n\
///     From: a@b\r\n\
///     Subject: hi\r\n\
///     \r\n\
///     Body text";
///
/// let verifier = Verifier::new(Config::default());
///
/// let results = verifier.parse_message(message)?;
///
/// assert_eq!(results.len(), 1);
/// assert_eq!(results[0].status, DkimStatus::None);
/// assert!(results[0].signature.is_some());
/// assert!(results[0].processed_header.is_some());
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
pub struct Verifier<P = DkimSignatureParser> {
    config: Config,
    parser: P,
}

impl Verifier {
    /// Creates a verifier using the default signature parser.
    pub fn new(config: Config) -> Self {
        Self::with_parser(config, DkimSignatureParser)
    }
}

impl<P: ParseSignature> Verifier<P> {
    /// Creates a verifier using the given signature parser.
    pub fn with_parser(config: Config, parser: P) -> Self {
        Self { config, parser }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Splits, segments, and isolates the signatures of a message, and runs
    /// each header set through the pipeline.
    ///
    /// There is one result per signature header, in order of appearance.
    /// Results that did not fail have status NONE.
    ///
    /// # Errors
    ///
    /// Fails if the message has no header boundary.
    pub fn parse_message(&self, message: &[u8]) -> Result<Vec<VerificationResult>, MessageError> {
        let message = RawMessage::split(message)?;

        Ok(self.process_message(&message))
    }

    /// Runs already isolated header sets through the pipeline.
    pub fn process_header_sets(
        &self,
        sets: &[SignatureHeaderSet],
        body: &[u8],
    ) -> Vec<VerificationResult> {
        let mut results = Vec::with_capacity(sets.len());

        for (i, set) in sets.iter().enumerate() {
            let result = if i < self.config.max_signatures {
                process_header_set(&self.parser, set, body)
            } else {
                trace!(index = set.index(), "signature over limit, not processed");
                let mut result = VerificationResult::new(set.index());
                result.fail(VerifierError::TooManySignatures);
                result
            };

            results.push(result);
        }

        results
    }

    /// Verifies all signatures in a message.
    ///
    /// There is one result per signature header, in order of appearance, and
    /// no result has status NONE.
    ///
    /// # Errors
    ///
    /// Fails if the message has no header boundary.
    pub async fn verify_message<T>(
        &self,
        resolver: &T,
        message: &[u8],
    ) -> Result<Vec<VerificationResult>, MessageError>
    where
        T: LookupTxt + ?Sized,
    {
        let message = RawMessage::split(message)?;

        let mut results = self.process_message(&message);

        self.complete_results(resolver, &mut results, message.body).await;

        Ok(results)
    }

    /// Completes all results still in status NONE by resolving the public key
    /// and verifying the signature. Results are processed one after another.
    ///
    /// `body` is the full, untruncated message body.
    pub async fn complete_results<T>(
        &self,
        resolver: &T,
        results: &mut [VerificationResult],
        body: &[u8],
    ) where
        T: LookupTxt + ?Sized,
    {
        for result in results.iter_mut() {
            if result.status != DkimStatus::None {
                continue;
            }

            let (Some(sig), Some(processed_header)) =
                (&result.signature, &result.processed_header)
            else {
                continue;
            };

            let completion =
                verify::complete_signature(resolver, &self.config, sig, processed_header, body)
                    .await;

            result.key_record = completion.key_record;
            result.key_size = completion.key_size;
            result.testing = completion.testing;

            match completion.outcome {
                Some(Ok(())) => result.succeed(),
                Some(Err(e)) => result.fail(e),
                None => {
                    trace!(index = result.index, "no key record to verify with");
                    result.fail(VerifierError::NoKeyFound);
                }
            }
        }

        debug_assert!(
            results.iter().all(|r| r.status != DkimStatus::None),
            "verification result left in status NONE"
        );
    }

    fn process_message(&self, message: &RawMessage<'_>) -> Vec<VerificationResult> {
        let headers = message.header_fields();

        let sets = isolate_signatures(&headers);

        self.process_header_sets(&sets, message.body)
    }
}
