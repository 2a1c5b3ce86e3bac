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

//! Location and isolation of signature headers.

use crate::{
    header::{HeaderField, HeaderFields},
    signature::is_signature_header_name,
};
use tracing::trace;

/// The header fields belonging to one signature under evaluation.
///
/// The signature header comes first, followed by all non-signature headers of
/// the message in their original order. Sets produced by
/// [`isolate_signatures`] never contain a second signature header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureHeaderSet {
    index: usize,
    headers: HeaderFields,
}

impl SignatureHeaderSet {
    /// Creates a set from arbitrary headers; `index` is the position of the
    /// signature header in the message.
    ///
    /// No checks are done here, a set whose first entry is not a signature
    /// header fails in the verification pipeline.
    pub fn new(index: usize, headers: impl Into<HeaderFields>) -> Self {
        Self {
            index,
            headers: headers.into(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    /// The first entry, which should be the signature header.
    pub fn first(&self) -> Option<&HeaderField> {
        self.headers.as_ref().first()
    }

    /// All entries after the first, the candidates for the signed headers.
    pub fn rest(&self) -> HeaderFields {
        self.headers
            .as_ref()
            .get(1..)
            .map(|rest| HeaderFields::new(rest.to_vec()))
            .unwrap_or_default()
    }
}

/// Returns the indexes of all signature headers, in order.
pub fn find_signature_headers(headers: &HeaderFields) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, (name, _))| is_signature_header_name(name))
        .map(|(i, _)| i)
        .collect()
}

/// Builds one isolated header set per signature header, in appearance order.
///
/// Each set holds its signature header first, then every non-signature header.
/// Sibling signature headers are dropped, so that a later signature can never
/// leak into the signed headers selected for an earlier one.
pub fn isolate_signatures(headers: &HeaderFields) -> Vec<SignatureHeaderSet> {
    let indexes = find_signature_headers(headers);

    trace!(count = indexes.len(), "located signature headers");

    let others: Vec<_> = headers
        .iter()
        .filter(|(name, _)| !is_signature_header_name(name))
        .collect();

    indexes
        .into_iter()
        .map(|index| {
            let mut set = Vec::with_capacity(others.len() + 1);
            set.push(headers.as_ref()[index].clone());
            set.extend(others.iter().map(|&header| header.clone()));

            SignatureHeaderSet::new(index, set)
        })
        .collect()
}

/// Removes all signature headers except `keep` from `headers`.
///
/// A signature header is kept only if it is equal to `keep` in both name and
/// value; all non-signature headers are kept. Order is preserved.
pub fn filter_signature_headers(headers: &HeaderFields, keep: &HeaderField) -> HeaderFields {
    let filtered: Vec<_> = headers
        .iter()
        .filter(|header| *header == keep || !is_signature_header_name(&header.0))
        .cloned()
        .collect();
    HeaderFields::new(filtered)
}
