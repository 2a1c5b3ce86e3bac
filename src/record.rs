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

//! Key model: the DKIM public key record published in DNS.

use crate::{
    crypto::{HashAlgorithm, KeyType},
    tag_list::{
        parse_base64_tag_value, parse_colon_separated_tag_value, TagList, TagListParseError,
        TagSpec,
    },
    util::encode_base64,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServiceType {
    Any,
    Email,
    Other(Box<str>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Flag {
    Testing,
    NoSubdomains,
    Other(Box<str>),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DkimKeyRecordParseError {
    TagListSyntax,
    DuplicateTag,
    InvalidBase64,
    UnsupportedVersion,
    MisplacedVersionTag,
    UnsupportedKeyType,
    NoSupportedHashAlgorithms,
    RevokedKey,
    MissingKeyTag,
    ServiceTypesEmpty,
}

impl Display for DkimKeyRecordParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::TagListSyntax => write!(f, "invalid tag-list"),
            Self::DuplicateTag => write!(f, "duplicate tag"),
            Self::InvalidBase64 => write!(f, "invalid Base64 string"),
            Self::UnsupportedVersion => write!(f, "unsupported version"),
            Self::MisplacedVersionTag => write!(f, "v= tag not initial"),
            Self::UnsupportedKeyType => write!(f, "unsupported key type"),
            Self::NoSupportedHashAlgorithms => write!(f, "no supported hash algorithms"),
            Self::RevokedKey => write!(f, "key revoked"),
            Self::MissingKeyTag => write!(f, "p= tag missing"),
            Self::ServiceTypesEmpty => write!(f, "service types empty"),
        }
    }
}

impl Error for DkimKeyRecordParseError {}

/// A DKIM public key record.
#[derive(Clone, Eq, PartialEq)]
pub struct DkimKeyRecord {
    /// Acceptable hash algorithms, never empty.
    pub hash_algorithms: Box<[HashAlgorithm]>,
    pub key_type: KeyType,
    /// The n= tag, uninterpreted.
    pub notes: Option<Box<str>>,
    pub key_data: Box<[u8]>,
    /// Service types, never empty.
    pub service_types: Box<[ServiceType]>,
    pub flags: Box<[Flag]>,
}

impl DkimKeyRecord {
    fn from_tag_list(tag_list: &TagList<'_>) -> Result<Self, DkimKeyRecordParseError> {
        use DkimKeyRecordParseError as E;

        let mut hash_algorithms = supported_hash_algorithms();
        let mut key_type = KeyType::Rsa;
        let mut notes = None;
        let mut key_data = None;
        let mut service_types = vec![ServiceType::Any];
        let mut flags = vec![];

        for (i, &TagSpec { name, value }) in tag_list.as_ref().iter().enumerate() {
            match name {
                "v" => {
                    if i != 0 {
                        return Err(E::MisplacedVersionTag);
                    }
                    if value != "DKIM1" {
                        return Err(E::UnsupportedVersion);
                    }
                }
                "h" => {
                    // unknown algorithms are ignored
                    hash_algorithms = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .filter_map(parse_hash_algorithm)
                        .collect();
                    if hash_algorithms.is_empty() {
                        return Err(E::NoSupportedHashAlgorithms);
                    }
                }
                "k" => {
                    key_type = if value.eq_ignore_ascii_case("rsa") {
                        KeyType::Rsa
                    } else if value.eq_ignore_ascii_case("ed25519") {
                        KeyType::Ed25519
                    } else {
                        return Err(E::UnsupportedKeyType);
                    };
                }
                "n" => {
                    notes = Some(value.into());
                }
                "p" => {
                    let data = parse_base64_tag_value(value).map_err(|_| E::InvalidBase64)?;
                    if data.is_empty() {
                        return Err(E::RevokedKey);
                    }
                    key_data = Some(data.into());
                }
                "s" => {
                    let types: Vec<_> = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .map(|s| match s {
                            "*" => ServiceType::Any,
                            s if s.eq_ignore_ascii_case("email") => ServiceType::Email,
                            s => ServiceType::Other(s.into()),
                        })
                        .collect();
                    if types.is_empty() {
                        return Err(E::ServiceTypesEmpty);
                    }
                    service_types = types;
                }
                "t" => {
                    flags = parse_colon_separated_tag_value(value)
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .map(|s| match s {
                            s if s.eq_ignore_ascii_case("y") => Flag::Testing,
                            s if s.eq_ignore_ascii_case("s") => Flag::NoSubdomains,
                            s => Flag::Other(s.into()),
                        })
                        .collect();
                }
                _ => {}
            }
        }

        let key_data = key_data.ok_or(E::MissingKeyTag)?;

        Ok(Self {
            hash_algorithms: hash_algorithms.into(),
            key_type,
            notes,
            key_data,
            service_types: service_types.into(),
            flags: flags.into(),
        })
    }

    pub fn is_testing(&self) -> bool {
        self.flags.contains(&Flag::Testing)
    }

    pub fn forbids_subdomains(&self) -> bool {
        self.flags.contains(&Flag::NoSubdomains)
    }

    pub fn allows_email(&self) -> bool {
        self.service_types
            .iter()
            .any(|s| matches!(s, ServiceType::Any | ServiceType::Email))
    }
}

impl FromStr for DkimKeyRecord {
    type Err = DkimKeyRecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag_list = TagList::parse(s).map_err(|e| match e {
            TagListParseError::DuplicateTag => DkimKeyRecordParseError::DuplicateTag,
            TagListParseError::Syntax => DkimKeyRecordParseError::TagListSyntax,
        })?;

        Self::from_tag_list(&tag_list)
    }
}

impl fmt::Debug for DkimKeyRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimKeyRecord")
            .field("hash_algorithms", &self.hash_algorithms)
            .field("key_type", &self.key_type)
            .field("notes", &self.notes)
            .field("key_data", &encode_base64(&self.key_data))
            .field("service_types", &self.service_types)
            .field("flags", &self.flags)
            .finish()
    }
}

fn supported_hash_algorithms() -> Vec<HashAlgorithm> {
    vec![
        HashAlgorithm::Sha256,
        #[cfg(feature = "pre-rfc8301")]
        HashAlgorithm::Sha1,
    ]
}

fn parse_hash_algorithm(s: &str) -> Option<HashAlgorithm> {
    if s.eq_ignore_ascii_case("sha256") {
        return Some(HashAlgorithm::Sha256);
    }
    #[cfg(feature = "pre-rfc8301")]
    if s.eq_ignore_ascii_case("sha1") {
        return Some(HashAlgorithm::Sha1);
    }
    None
}
