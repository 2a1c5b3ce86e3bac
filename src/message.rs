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

//! Splitting of raw messages into header fields and body.
//!
//! A raw message is accepted only as bytes: line endings and any non-UTF-8
//! content must reach the canonicalization stage unmodified.

use crate::header::{FieldBody, FieldName, HeaderField, HeaderFields};
use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};
use tracing::trace;

const HEADER_BOUNDARY: &[u8] = b"\r\n\r\n";

/// An error that makes the whole message unusable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageError {
    /// The message contains no blank line separating header and body.
    NoHeaderBoundary,
}

impl Display for MessageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHeaderBoundary => write!(f, "no header boundary found"),
        }
    }
}

impl Error for MessageError {}

/// A raw message split at its header boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RawMessage<'a> {
    /// The header block, without the terminating blank line.
    pub header: &'a [u8],
    /// The body, everything after the blank line.
    pub body: &'a [u8],
}

impl<'a> RawMessage<'a> {
    /// Splits a message at the first occurrence of CRLF CRLF.
    pub fn split(message: &'a [u8]) -> Result<Self, MessageError> {
        let boundary = message
            .find(HEADER_BOUNDARY)
            .ok_or(MessageError::NoHeaderBoundary)?;

        trace!(boundary, "found header boundary");

        Ok(Self {
            header: &message[..boundary],
            body: &message[(boundary + HEADER_BOUNDARY.len())..],
        })
    }

    /// Segments the header block into header fields.
    pub fn header_fields(&self) -> HeaderFields {
        segment_headers(self.header)
    }
}

/// Splits a header block into logical header fields, in order.
///
/// A header field starts at every line that does not begin with SP or HTAB;
/// lines that do are continuation lines and are rejoined with the preceding
/// field, blank continuation lines included. Name and body are kept byte for
/// byte. Only lines without a field name are skipped: lines lacking a colon,
/// or a continuation with no preceding field. A signature header always has a
/// field name and is therefore never skipped.
pub fn segment_headers(header: &[u8]) -> HeaderFields {
    let mut fields = vec![];

    for line in split_logical_lines(header) {
        match parse_header_field(line) {
            Some(field) => fields.push(field),
            None => {
                trace!(line = ?line.as_bstr(), "skipping line without field name");
            }
        }
    }

    trace!(count = fields.len(), "segmented header block");

    HeaderFields::new(fields)
}

// Each returned slice is one header including its folded continuation lines,
// without the final CRLF.
fn split_logical_lines(header: &[u8]) -> Vec<&[u8]> {
    let mut lines = vec![];
    let mut start = 0;
    let mut i = 0;

    while let Some(n) = header[i..].find("\r\n") {
        let crlf = i + n;
        let next = crlf + 2;
        match header.get(next) {
            Some(b' ' | b'\t') => {}
            _ => {
                lines.push(&header[start..crlf]);
                start = next;
            }
        }
        i = next;
    }

    if start < header.len() {
        lines.push(&header[start..]);
    }

    lines
}

fn parse_header_field(line: &[u8]) -> Option<HeaderField> {
    let colon = line.find_byte(b':')?;

    let name = std::str::from_utf8(&line[..colon]).ok()?;
    let name = FieldName::new(name).ok()?;
    let body = FieldBody::new(&line[(colon + 1)..]).ok()?;

    Some((name, body))
}
