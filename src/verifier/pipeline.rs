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

//! Per-signature processing of an isolated header set.

use crate::{
    canonicalize::{canonicalize_header, canonicalize_headers},
    header::{FieldBody, FieldName},
    signature::{
        is_signature_header_name, strip_signature_data, DkimSignature, DkimSignatureError,
        DkimSignatureErrorKind, ParseSignature,
    },
    verifier::{SignatureHeaderSet, VerificationResult, VerifierError},
};
use std::str;
use tracing::trace;

/// Runs one header set through validation, parsing, body truncation, and
/// header canonicalization.
///
/// The returned result is either failed (PERMFAIL) or still in status NONE with
/// `signature`, `processed_header`, and `signed_body` filled in, ready for key
/// resolution and cryptographic verification.
pub fn process_header_set<P>(
    parser: &P,
    set: &SignatureHeaderSet,
    body: &[u8],
) -> VerificationResult
where
    P: ParseSignature + ?Sized,
{
    let index = set.index();
    let mut result = VerificationResult::new(index);

    let (name, value) = match set.first() {
        Some((name, value)) if is_signature_header_name(name) => (name, value),
        _ => {
            trace!(index, "header set does not start with a signature header");
            result.fail(VerifierError::MissingSignatureHeader);
            return result;
        }
    };

    let sig = match parse_signature(parser, value) {
        Ok(sig) => sig,
        Err(e) => {
            trace!(index, "could not parse signature: {e}");
            result.fail(VerifierError::SignatureFormat(e));
            return result;
        }
    };

    let signed_body = match truncate_body(body, sig.body_length) {
        Ok(b) => b,
        Err(e) => {
            result.signature = Some(sig);
            result.fail(e);
            return result;
        }
    };

    let processed_header = compute_processed_header(&sig, set, name, value);

    trace!(
        index,
        domain = %sig.domain,
        header_len = processed_header.len(),
        body_len = signed_body.len(),
        "prepared signature for verification"
    );

    result.signature = Some(sig);
    result.processed_header = Some(processed_header.into());
    result.signed_body = Some(signed_body.into());

    result
}

fn parse_signature<P>(parser: &P, value: &FieldBody) -> Result<DkimSignature, DkimSignatureError>
where
    P: ParseSignature + ?Sized,
{
    // well-formed signatures contain only UTF-8
    let value = str::from_utf8(value.as_ref())
        .map_err(|_| DkimSignatureError::new(DkimSignatureErrorKind::Utf8Encoding))?;

    parser.parse_signature(value)
}

/// Returns the first `body_length` bytes of the raw body, or all of it.
fn truncate_body(body: &[u8], body_length: Option<u64>) -> Result<&[u8], VerifierError> {
    match body_length {
        None => Ok(body),
        Some(len) => {
            let len = usize::try_from(len).map_err(|_| {
                trace!(len, "signed body length too large");
                VerifierError::Overflow
            })?;

            if len < body.len() {
                trace!(len, "truncating body");
                Ok(&body[..len])
            } else {
                Ok(body)
            }
        }
    }
}

// The signed headers selected from the set without the signature header, then
// the signature header itself with empty b= and no CRLF.
fn compute_processed_header(
    sig: &DkimSignature,
    set: &SignatureHeaderSet,
    name: &FieldName,
    value: &FieldBody,
) -> Vec<u8> {
    let algorithm = sig.canonicalization.header;

    let mut result = canonicalize_headers(algorithm, &set.rest(), &sig.signed_headers);

    let value = strip_signature_data(value.as_ref());
    canonicalize_header(&mut result, algorithm, name, value);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{header::HeaderFields, signature::DkimSignatureParser, verifier::DkimStatus};

    fn header_set(index: usize, headers: &[(&str, &str)]) -> SignatureHeaderSet {
        let headers: Vec<_> = headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.as_bytes().to_vec()))
            .collect();
        SignatureHeaderSet::new(index, HeaderFields::from_vec(headers).unwrap())
    }

    #[test]
    fn process_header_set_simple() {
        let set = header_set(
            0,
            &[
                (
                    "DKIM-Signature",
                    " v=1; a=rsa-sha256; d=example.com; s=sel; h=From:Subject; bh=YQ==; b=YWJj",
                ),
                ("From", " a@b"),
                ("Subject", " hi"),
            ],
        );

        let result = process_header_set(&DkimSignatureParser, &set, b"Body text");

        assert_eq!(result.status, DkimStatus::None);
        assert_eq!(result.error, None);
        assert!(result.signature.is_some());
        assert_eq!(
            result.processed_header.as_deref(),
            Some(
                &b"From: a@b\r\nSubject: hi\r\nDKIM-Signature: v=1; a=rsa-sha256; \
                d=example.com; s=sel; h=From:Subject; bh=YQ==; b="[..]
            )
        );
        assert_eq!(result.signed_body.as_deref(), Some(&b"Body text"[..]));
    }

    #[test]
    fn process_header_set_relaxed_and_truncated() {
        let set = header_set(
            3,
            &[
                (
                    "dkim-signature",
                    " v=1; a=ed25519-sha256; c=relaxed/relaxed; d=example.com;\r\n\
                    \ts=sel; h=from : subject : subject; l=4; bh=YQ==; b=YW\r\n\tJj",
                ),
                ("Subject", " one"),
                ("FROM", "  a@b  "),
                ("Subject", " two \t words"),
            ],
        );

        let result = process_header_set(&DkimSignatureParser, &set, b"Body text");

        assert_eq!(result.index, 3);
        assert_eq!(result.status, DkimStatus::None);
        assert_eq!(
            result.processed_header.as_deref(),
            Some(
                &b"from:a@b\r\nsubject:two words\r\nsubject:one\r\n\
                dkim-signature:v=1; a=ed25519-sha256; c=relaxed/relaxed; d=example.com; \
                s=sel; h=from : subject : subject; l=4; bh=YQ==; b="[..]
            )
        );
        assert_eq!(result.signed_body.as_deref(), Some(&b"Body"[..]));
    }

    #[test]
    fn process_header_set_missing_signature_header() {
        let set = header_set(0, &[("From", " a@b"), ("Subject", " hi")]);

        let result = process_header_set(&DkimSignatureParser, &set, b"");

        assert_eq!(result.status, DkimStatus::PermFail);
        assert_eq!(result.error, Some(VerifierError::MissingSignatureHeader));
        assert_eq!(result.error.unwrap().to_string(), "Missing DKIM-Signature");
        assert!(!result.verified);
        assert!(result.signature.is_none());
        assert!(result.processed_header.is_none());
    }

    #[test]
    fn process_header_set_parse_failure() {
        let set = header_set(1, &[("DKIM-Signature", " v=1; a=rsa-sha256; d=example.com")]);

        let result = process_header_set(&DkimSignatureParser, &set, b"");

        assert_eq!(result.status, DkimStatus::PermFail);
        assert!(matches!(result.error, Some(VerifierError::SignatureFormat(_))));
        assert!(result.signature.is_none());
    }

    #[test]
    fn process_header_set_non_utf8() {
        let set = SignatureHeaderSet::new(
            0,
            vec![(
                FieldName::new("DKIM-Signature").unwrap(),
                FieldBody::new(&b" v=1; d=\xffexample.com"[..]).unwrap(),
            )],
        );

        let result = process_header_set(&DkimSignatureParser, &set, b"");

        assert_eq!(
            result.error,
            Some(VerifierError::SignatureFormat(DkimSignatureError::new(
                DkimSignatureErrorKind::Utf8Encoding
            )))
        );
    }

    #[test]
    fn process_header_set_custom_parser() {
        let set = header_set(0, &[("X-Google-DKIM-Signature", " anything"), ("From", " a@b")]);

        let parser = |value: &str| -> Result<DkimSignature, DkimSignatureError> {
            assert_eq!(value, " anything");
            Err(DkimSignatureError::new(DkimSignatureErrorKind::ValueSyntax))
        };

        let result = process_header_set(&parser, &set, b"");

        assert_eq!(
            result.error,
            Some(VerifierError::SignatureFormat(DkimSignatureError::new(
                DkimSignatureErrorKind::ValueSyntax
            )))
        );
    }

    #[test]
    fn truncate_body_lengths() {
        assert_eq!(truncate_body(b"abcdef", None), Ok(&b"abcdef"[..]));
        assert_eq!(truncate_body(b"abcdef", Some(2)), Ok(&b"ab"[..]));
        assert_eq!(truncate_body(b"abcdef", Some(0)), Ok(&b""[..]));
        assert_eq!(truncate_body(b"abcdef", Some(100)), Ok(&b"abcdef"[..]));
    }
}
