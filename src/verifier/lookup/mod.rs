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

#[cfg(feature = "hickory-resolver")]
mod hickory_resolver;

use std::{future::Future, io};

/// A trait for looking up the DNS TXT records holding DKIM key records.
///
/// Errors are reported as `std::io::Error`. These error kinds on the query
/// result receive special treatment:
///
/// * `ErrorKind::InvalidInput`: the domain could not be used as a query name
/// * `ErrorKind::NotFound`: NXDOMAIN, no key record
/// * `ErrorKind::TimedOut`: timeout
///
/// All other errors count as temporary lookup failures. The per-record
/// `std::io::Error` signals problems with an individual TXT record.
pub trait LookupTxt: Send + Sync {
    /// The TXT records found.
    type Answer: IntoIterator<Item = io::Result<Vec<u8>>>;
    /// The future resolving to the answer.
    type Query<'a>: Future<Output = io::Result<Self::Answer>> + Send + 'a
    where
        Self: 'a;

    /// Looks up the TXT records of `domain`.
    ///
    /// The domain is passed in A-label form and fully qualified, for example
    /// `selector._domainkey.example.com.`.
    fn lookup_txt(&self, domain: &str) -> Self::Query<'_>;
}
