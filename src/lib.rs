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

//! A library for extracting and verifying the *DomainKeys Identified Mail*
//! (DKIM) signatures of an email message, as described in [RFC 6376].
//!
//! A message may carry several signatures, added by different relays and
//! possibly under different header names (`DKIM-Signature`, or the vendor
//! variant `X-Google-DKIM-Signature`). Each signature is evaluated against its
//! own isolated set of headers: the signature header itself followed by every
//! non-signature header of the message. Sibling signatures therefore never end
//! up in the data hashed for another signature.
//!
//! # Usage
//!
//! The type [`Verifier`] provides the entry point. Its method
//! [`parse_message`][Verifier::parse_message] runs the extraction and
//! canonicalization stages only; [`verify_message`][Verifier::verify_message]
//! additionally resolves the public keys through a [`LookupTxt`] implementation
//! and verifies each signature.
//!
//! The building blocks are available in the additional modules: message
//! splitting and header segmentation (`message`), signature and key record
//! parsing (`signature`, `record`), canonicalization (`canonicalize`), and the
//! cryptographic primitives (`crypto`).
//!
//! # Cargo features
//!
//! The feature **`hickory-resolver`** makes an implementation of
//! [`LookupTxt`][crate::verifier::LookupTxt] available for the Hickory DNS
//! resolver.
//!
//! The feature **`pre-rfc8301`** reverts cryptographic algorithm and key usage
//! back to before [RFC 8301]: it lowers the minimum RSA key size to 512 bits,
//! and enables dependency `sha1` and thereby the insecure, historic SHA-1 hash
//! algorithm. This is a legacy compatibility feature, its use is strongly
//! discouraged.
//!
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376
//! [RFC 8301]: https://www.rfc-editor.org/rfc/rfc8301

pub mod canonicalize;
pub mod crypto;
pub mod header;
pub mod message;
pub mod record;
pub mod signature;
mod tag_list;
mod util;
pub mod verifier;

pub use crate::{
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    message::{MessageError, RawMessage},
    record::DkimKeyRecord,
    signature::{
        DkimSignature, DkimSignatureError, DkimSignatureParser, DomainName, ParseSignature,
        Selector, SignatureAlgorithm,
    },
    util::{encode_base64, CanonicalStr},
    verifier::{
        filter_signature_headers, Config, DkimStatus, LookupTxt, SignatureHeaderSet,
        VerificationResult, Verifier, VerifierError,
    },
};
