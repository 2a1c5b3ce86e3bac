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

//! Representation of email header data.

use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    slice,
};

/// A logical header field: name and (possibly folded) body.
pub type HeaderField = (FieldName, FieldBody);

/// An error indicating an ill-formed header field name or body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderFieldError;

impl Display for HeaderFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ill-formed header field")
    }
}

impl Error for HeaderFieldError {}

/// An ordered sequence of header fields, duplicates included.
///
/// Unlike a map, this preserves the original order of the header block, which
/// matters both for locating signatures and for selecting signed headers
/// bottom-up.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderFields(Box<[HeaderField]>);

impl HeaderFields {
    pub fn new(value: impl Into<Box<[HeaderField]>>) -> Self {
        Self(value.into())
    }

    pub fn from_vec(value: Vec<(String, Vec<u8>)>) -> Result<Self, HeaderFieldError> {
        let value: Vec<_> = value
            .into_iter()
            .map(|(name, value)| {
                let name = FieldName::new(name)?;
                let body = FieldBody::new(value)?;
                Ok((name, body))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::new(value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, HeaderField> {
        self.0.iter()
    }
}

impl AsRef<[HeaderField]> for HeaderFields {
    fn as_ref(&self) -> &[HeaderField] {
        &self.0
    }
}

impl From<Vec<HeaderField>> for HeaderFields {
    fn from(value: Vec<HeaderField>) -> Self {
        Self::new(value)
    }
}

impl From<HeaderFields> for Vec<HeaderField> {
    fn from(value: HeaderFields) -> Self {
        value.0.into_vec()
    }
}

impl IntoIterator for HeaderFields {
    type Item = HeaderField;
    type IntoIter = std::vec::IntoIter<HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_vec().into_iter()
    }
}

impl<'a> IntoIterator for &'a HeaderFields {
    type Item = &'a HeaderField;
    type IntoIter = slice::Iter<'a, HeaderField>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A header field name. Comparison is case-insensitive.
///
/// The name is kept as written, including any WSP between name and colon
/// (obsolete syntax, RFC 5322, section 4.5). Comparison and hashing ignore that
/// trailing WSP.
#[derive(Clone, Eq)]
pub struct FieldName(Box<str>);

impl FieldName {
    pub fn new(value: impl Into<Box<str>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();
        let name = trim_wsp_end(&value);
        if name.is_empty() {
            return Err(HeaderFieldError);
        }
        if !name.chars().all(|c| c.is_ascii_graphic() && c != ':') {
            return Err(HeaderFieldError);
        }
        Ok(Self(value))
    }

    /// Returns the name without WSP preceding the colon.
    pub fn trimmed(&self) -> &str {
        trim_wsp_end(&self.0)
    }
}

fn trim_wsp_end(s: &str) -> &str {
    s.trim_end_matches([' ', '\t'])
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Debug for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.trimmed().eq_ignore_ascii_case(other.trimmed())
    }
}

impl PartialEq<&str> for FieldName {
    fn eq(&self, other: &&str) -> bool {
        self.trimmed().eq_ignore_ascii_case(other)
    }
}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trimmed().to_ascii_lowercase().hash(state);
    }
}

/// A header field body: everything after the colon, folding included, without
/// the terminating CRLF.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct FieldBody(Box<[u8]>);

impl FieldBody {
    pub fn new(value: impl Into<Box<[u8]>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();

        // every CRLF must be followed by WSP; a continuation line may be blank
        // (obs-FWS), and stray CR or LF are kept as ordinary bytes
        let folded = value
            .split_str("\r\n")
            .skip(1)
            .all(|line| line.starts_with(b" ") || line.starts_with(b"\t"));
        if !folded {
            return Err(HeaderFieldError);
        }

        // UTF-8 is not required either (eg stray Latin 1)
        Ok(Self(value))
    }

    /// Returns the body with folding removed, ie with every CRLF deleted.
    pub fn unfolded(&self) -> Vec<u8> {
        self.0.replace("\r\n", "")
    }
}

impl AsRef<[u8]> for FieldBody {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for FieldBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldBody")
            .field(&self.0.as_bstr())
            .finish()
    }
}
