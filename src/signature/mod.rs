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

//! Signature model: the parsed content of a DKIM signature header.

mod names;

pub use names::{DomainName, Identity, ParseDomainError, Selector};

use crate::{
    crypto::{HashAlgorithm, KeyType},
    header::FieldName,
    tag_list::{
        parse_base64_tag_value, parse_colon_separated_tag_value, TagList, TagListParseError,
        TagSpec,
    },
    util::{encode_base64, CanonicalStr},
};
use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// Header names under which DKIM signatures are found.
///
/// Besides the standard name, the alias used by Google for its internal
/// signatures is recognised.
pub const SIGNATURE_HEADER_NAMES: [&str; 2] = ["DKIM-Signature", "X-Google-DKIM-Signature"];

/// Returns whether a header name denotes a DKIM signature header.
///
/// The comparison is an exact, case-insensitive match of the whole name. WSP
/// between name and colon is ignored.
pub fn is_signature_header_name(name: impl AsRef<str>) -> bool {
    let name = name.as_ref().trim_end_matches([' ', '\t']);
    SIGNATURE_HEADER_NAMES
        .iter()
        .any(|n| n.eq_ignore_ascii_case(name))
}

/// A signature algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignatureAlgorithm {
    /// The *rsa-sha256* signature algorithm.
    RsaSha256,
    /// The *ed25519-sha256* signature algorithm.
    Ed25519Sha256,
    /// The historic *rsa-sha1* signature algorithm.
    #[cfg(feature = "pre-rfc8301")]
    RsaSha1,
}

impl SignatureAlgorithm {
    pub fn key_type(self) -> KeyType {
        match self {
            Self::RsaSha256 => KeyType::Rsa,
            Self::Ed25519Sha256 => KeyType::Ed25519,
            #[cfg(feature = "pre-rfc8301")]
            Self::RsaSha1 => KeyType::Rsa,
        }
    }

    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha256 | Self::Ed25519Sha256 => HashAlgorithm::Sha256,
            #[cfg(feature = "pre-rfc8301")]
            Self::RsaSha1 => HashAlgorithm::Sha1,
        }
    }
}

impl CanonicalStr for SignatureAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-sha256",
            Self::Ed25519Sha256 => "ed25519-sha256",
            #[cfg(feature = "pre-rfc8301")]
            Self::RsaSha1 => "rsa-sha1",
        }
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = DkimSignatureErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[cfg(feature = "pre-rfc8301")]
        if s.eq_ignore_ascii_case("rsa-sha1") {
            return Ok(Self::RsaSha1);
        }

        if s.eq_ignore_ascii_case("rsa-sha256") {
            Ok(Self::RsaSha256)
        } else if s.eq_ignore_ascii_case("ed25519-sha256") {
            Ok(Self::Ed25519Sha256)
        } else if s.eq_ignore_ascii_case("rsa-sha1") {
            // RFC 8301
            Err(DkimSignatureErrorKind::HistoricAlgorithm)
        } else {
            Err(DkimSignatureErrorKind::UnsupportedAlgorithm)
        }
    }
}

/// A canonicalization algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CanonicalizationAlgorithm {
    #[default]
    Simple,
    Relaxed,
}

impl CanonicalStr for CanonicalizationAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }
}

impl Display for CanonicalizationAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for CanonicalizationAlgorithm {
    type Err = DkimSignatureErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("simple") {
            Ok(Self::Simple)
        } else if s.eq_ignore_ascii_case("relaxed") {
            Ok(Self::Relaxed)
        } else {
            Err(DkimSignatureErrorKind::UnsupportedCanonicalization)
        }
    }
}

/// The header/body canonicalization pair of the c= tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Canonicalization {
    pub header: CanonicalizationAlgorithm,
    pub body: CanonicalizationAlgorithm,
}

impl Display for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.header, self.body)
    }
}

impl FromStr for Canonicalization {
    type Err = DkimSignatureErrorKind;

    /// Parses `header[/body]`; a missing body part means *simple*.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((header, body)) => Ok(Self {
                header: header.parse()?,
                body: body.parse()?,
            }),
            None => Ok(Self {
                header: s.parse()?,
                body: CanonicalizationAlgorithm::Simple,
            }),
        }
    }
}

/// A failure to parse a DKIM signature header value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DkimSignatureError {
    pub kind: DkimSignatureErrorKind,
    /// The signing domain, if the d= tag could still be read.
    pub domain: Option<DomainName>,
}

impl DkimSignatureError {
    pub fn new(kind: DkimSignatureErrorKind) -> Self {
        Self { kind, domain: None }
    }
}

impl Display for DkimSignatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{} (d={domain})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Error for DkimSignatureError {}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DkimSignatureErrorKind {
    Utf8Encoding,
    InvalidTagList,
    DuplicateTag,
    MissingVersionTag,
    UnsupportedVersion,
    HistoricAlgorithm,
    UnsupportedAlgorithm,
    MissingAlgorithmTag,
    MissingSignatureTag,
    MissingBodyHashTag,
    UnsupportedCanonicalization,
    InvalidDomain,
    MissingDomainTag,
    SignedHeadersEmpty,
    FromHeaderNotSigned,
    MissingSignedHeadersTag,
    InvalidBodyLength,
    QueryMethodsNotSupported,
    InvalidSelector,
    MissingSelectorTag,
    InvalidTimestamp,
    InvalidExpiration,
    ExpirationNotAfterTimestamp,
    InvalidUserId,
    DomainMismatch,
    ValueSyntax,
}

impl Display for DkimSignatureErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8Encoding => write!(f, "signature not UTF-8 encoded"),
            Self::InvalidTagList => write!(f, "invalid tag-list"),
            Self::DuplicateTag => write!(f, "duplicate tag"),
            Self::MissingVersionTag => write!(f, "v= tag missing"),
            Self::UnsupportedVersion => write!(f, "unsupported version"),
            Self::HistoricAlgorithm => write!(f, "historic signature algorithm"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported algorithm"),
            Self::MissingAlgorithmTag => write!(f, "a= tag missing"),
            Self::MissingSignatureTag => write!(f, "b= tag missing"),
            Self::MissingBodyHashTag => write!(f, "bh= tag missing"),
            Self::UnsupportedCanonicalization => write!(f, "unsupported canonicalization"),
            Self::InvalidDomain => write!(f, "invalid domain"),
            Self::MissingDomainTag => write!(f, "d= tag missing"),
            Self::SignedHeadersEmpty => write!(f, "no signed headers"),
            Self::FromHeaderNotSigned => write!(f, "From header not signed"),
            Self::MissingSignedHeadersTag => write!(f, "h= tag missing"),
            Self::InvalidBodyLength => write!(f, "invalid body length"),
            Self::QueryMethodsNotSupported => write!(f, "query method not supported"),
            Self::InvalidSelector => write!(f, "invalid selector"),
            Self::MissingSelectorTag => write!(f, "s= tag missing"),
            Self::InvalidTimestamp => write!(f, "invalid timestamp"),
            Self::InvalidExpiration => write!(f, "invalid expiration"),
            Self::ExpirationNotAfterTimestamp => write!(f, "expiration not after timestamp"),
            Self::InvalidUserId => write!(f, "invalid user ID"),
            Self::DomainMismatch => write!(f, "i= domain not within d= domain"),
            Self::ValueSyntax => write!(f, "syntax error in tag value"),
        }
    }
}

impl Error for DkimSignatureErrorKind {}

/// A parsed DKIM signature.
#[derive(Clone, Eq, PartialEq)]
pub struct DkimSignature {
    pub algorithm: SignatureAlgorithm,
    pub signature_data: Box<[u8]>,
    pub body_hash: Box<[u8]>,
    pub canonicalization: Canonicalization,
    pub domain: DomainName,
    /// The h= list, in order, duplicates included.
    pub signed_headers: Box<[FieldName]>,
    pub user_id: Option<Identity>,
    pub body_length: Option<u64>,
    pub selector: Selector,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
}

impl DkimSignature {
    fn from_tag_list(tag_list: &TagList<'_>) -> Result<Self, DkimSignatureErrorKind> {
        use DkimSignatureErrorKind as Kind;

        let mut version_seen = false;
        let mut algorithm = None;
        let mut signature_data = None;
        let mut body_hash = None;
        let mut canonicalization = None;
        let mut domain = None;
        let mut signed_headers = None;
        let mut user_id = None;
        let mut body_length = None;
        let mut selector = None;
        let mut timestamp = None;
        let mut expiration = None;

        for &TagSpec { name, value } in tag_list.as_ref() {
            match name {
                "v" => {
                    if value != "1" {
                        return Err(Kind::UnsupportedVersion);
                    }
                    version_seen = true;
                }
                "a" => {
                    algorithm = Some(value.parse()?);
                }
                "b" => {
                    let value = parse_base64_tag_value(value).map_err(|_| Kind::ValueSyntax)?;
                    signature_data = Some(value.into());
                }
                "bh" => {
                    let value = parse_base64_tag_value(value).map_err(|_| Kind::ValueSyntax)?;
                    body_hash = Some(value.into());
                }
                "c" => {
                    canonicalization = Some(value.parse()?);
                }
                "d" => {
                    let value = DomainName::new(value).map_err(|_| Kind::InvalidDomain)?;
                    domain = Some(value);
                }
                "h" => {
                    let names = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .map(FieldName::new)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|_| Kind::ValueSyntax)?;
                    if names.is_empty() {
                        return Err(Kind::SignedHeadersEmpty);
                    }
                    if !names.iter().any(|n| *n == "From") {
                        return Err(Kind::FromHeaderNotSigned);
                    }
                    signed_headers = Some(names.into());
                }
                "i" => {
                    let value = Identity::new(value).map_err(|_| Kind::InvalidUserId)?;
                    user_id = Some(value);
                }
                "l" => {
                    let value = parse_decimal(value).ok_or(Kind::InvalidBodyLength)?;
                    body_length = Some(value);
                }
                "q" => {
                    let dns_txt = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .any(|m| m.eq_ignore_ascii_case("dns/txt"));
                    if !dns_txt {
                        return Err(Kind::QueryMethodsNotSupported);
                    }
                }
                "s" => {
                    let value = Selector::new(value).map_err(|_| Kind::InvalidSelector)?;
                    selector = Some(value);
                }
                "t" => {
                    let value = parse_decimal(value).ok_or(Kind::InvalidTimestamp)?;
                    timestamp = Some(value);
                }
                "x" => {
                    let value = parse_decimal(value).ok_or(Kind::InvalidExpiration)?;
                    expiration = Some(value);
                }
                _ => {}
            }
        }

        if !version_seen {
            return Err(Kind::MissingVersionTag);
        }

        let algorithm = algorithm.ok_or(Kind::MissingAlgorithmTag)?;
        let signature_data = signature_data.ok_or(Kind::MissingSignatureTag)?;
        let body_hash = body_hash.ok_or(Kind::MissingBodyHashTag)?;
        let domain = domain.ok_or(Kind::MissingDomainTag)?;
        let signed_headers = signed_headers.ok_or(Kind::MissingSignedHeadersTag)?;
        let selector = selector.ok_or(Kind::MissingSelectorTag)?;

        if let Some(i) = &user_id {
            if !i.domain_part.eq_or_subdomain_of(&domain) {
                return Err(Kind::DomainMismatch);
            }
        }

        if let (Some(t), Some(x)) = (timestamp, expiration) {
            if x <= t {
                return Err(Kind::ExpirationNotAfterTimestamp);
            }
        }

        Ok(Self {
            algorithm,
            signature_data,
            body_hash,
            canonicalization: canonicalization.unwrap_or_default(),
            domain,
            signed_headers,
            user_id,
            body_length,
            selector,
            timestamp,
            expiration,
        })
    }

    /// The agent or user identifier, defaulting to `@` plus the d= domain.
    pub fn identity(&self) -> Identity {
        self.user_id
            .clone()
            .unwrap_or_else(|| Identity::from_domain(self.domain.clone()))
    }
}

impl FromStr for DkimSignature {
    type Err = DkimSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag_list = TagList::parse(s).map_err(|e| {
            DkimSignatureError::new(match e {
                TagListParseError::DuplicateTag => DkimSignatureErrorKind::DuplicateTag,
                TagListParseError::Syntax => DkimSignatureErrorKind::InvalidTagList,
            })
        })?;

        Self::from_tag_list(&tag_list).map_err(|kind| {
            // recover the domain for diagnostics, if possible
            let domain = tag_list.get("d").and_then(|d| DomainName::new(d).ok());
            DkimSignatureError { kind, domain }
        })
    }
}

impl fmt::Debug for DkimSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimSignature")
            .field("algorithm", &self.algorithm)
            .field("signature_data", &encode_base64(&self.signature_data))
            .field("body_hash", &encode_base64(&self.body_hash))
            .field("canonicalization", &self.canonicalization)
            .field("domain", &self.domain)
            .field("signed_headers", &self.signed_headers)
            .field("user_id", &self.user_id)
            .field("body_length", &self.body_length)
            .field("selector", &self.selector)
            .field("timestamp", &self.timestamp)
            .field("expiration", &self.expiration)
            .finish()
    }
}

fn parse_decimal(value: &str) -> Option<u64> {
    // at most 76 digits per RFC 6376, but anything beyond u64 is unusable
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Parses the value of a signature header into a [`DkimSignature`].
///
/// This is the seam through which the verifier obtains the signature model.
/// Any closure of the right shape can stand in for the default parser.
pub trait ParseSignature {
    fn parse_signature(&self, value: &str) -> Result<DkimSignature, DkimSignatureError>;
}

/// The default RFC 6376 signature parser.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DkimSignatureParser;

impl ParseSignature for DkimSignatureParser {
    fn parse_signature(&self, value: &str) -> Result<DkimSignature, DkimSignatureError> {
        value.parse()
    }
}

impl<F> ParseSignature for F
where
    F: Fn(&str) -> Result<DkimSignature, DkimSignatureError>,
{
    fn parse_signature(&self, value: &str) -> Result<DkimSignature, DkimSignatureError> {
        self(value)
    }
}

/// Returns a copy of a signature header value with the b= tag value removed.
///
/// Everything else, including whitespace around the tag name and the `=`, is
/// preserved byte for byte, as required for computing the data hash.
pub fn strip_signature_data(value: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(value.len());

    for (i, segment) in value.split_str(";").enumerate() {
        if i > 0 {
            result.push(b';');
        }
        match segment.find_byte(b'=') {
            Some(eq) if is_b_tag_name(&segment[..eq]) => {
                result.extend_from_slice(&segment[..=eq]);
            }
            _ => result.extend_from_slice(segment),
        }
    }

    result
}

fn is_b_tag_name(name: &[u8]) -> bool {
    name.trim_with(|c| matches!(c, ' ' | '\t' | '\r' | '\n')) == b"b"
}
