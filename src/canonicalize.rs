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

//! Header and body canonicalization, RFC 6376, section 3.4.

use crate::{
    header::{FieldName, HeaderFields},
    signature::CanonicalizationAlgorithm,
};
use bstr::ByteSlice;

const SP: u8 = b' ';
const CRLF: &[u8] = b"\r\n";

fn is_wsp(b: u8) -> bool {
    matches!(b, b' ' | b'\t')
}

/// Produces the header canonicalization result for the signed header names.
///
/// For every name in `signed_headers`, the bottom-most header of that name not
/// yet consumed is selected. A name listed twice thus selects the last and then
/// the second-to-last occurrence. Names without a remaining occurrence
/// contribute nothing. Every selected header is terminated with CRLF.
pub fn canonicalize_headers(
    algorithm: CanonicalizationAlgorithm,
    headers: &HeaderFields,
    signed_headers: &[FieldName],
) -> Vec<u8> {
    let headers = headers.as_ref();

    let mut result = vec![];
    let mut consumed = vec![false; headers.len()];

    for signed_name in signed_headers {
        let next = headers
            .iter()
            .enumerate()
            .rev()
            .find(|(i, (name, _))| !consumed[*i] && name == signed_name);

        if let Some((i, (name, value))) = next {
            canonicalize_header(&mut result, algorithm, name, value);
            result.extend(CRLF);
            consumed[i] = true;
        }
    }

    result
}

/// Canonicalizes one header field into `result`, without terminating CRLF.
pub fn canonicalize_header(
    result: &mut Vec<u8>,
    algorithm: CanonicalizationAlgorithm,
    name: impl AsRef<str>,
    value: impl AsRef<[u8]>,
) {
    let name = name.as_ref();
    let value = value.as_ref();

    match algorithm {
        CanonicalizationAlgorithm::Simple => {
            result.extend(name.bytes());
            result.push(b':');
            result.extend(value);
        }
        CanonicalizationAlgorithm::Relaxed => {
            let name = name.trim_end_matches([' ', '\t']);
            result.extend(name.to_ascii_lowercase().bytes());
            result.push(b':');
            let unfolded = value.replace(CRLF, "");
            compress_wsp(result, unfolded.trim_with(|c| matches!(c, ' ' | '\t')));
        }
    }
}

// Replaces each run of WSP with a single SP.
fn compress_wsp(result: &mut Vec<u8>, bytes: &[u8]) {
    let mut in_wsp = false;
    for &b in bytes {
        if is_wsp(b) {
            if !in_wsp {
                result.push(SP);
                in_wsp = true;
            }
        } else {
            result.push(b);
            in_wsp = false;
        }
    }
}

/// Canonicalizes a whole message body.
///
/// Only CRLF is recognised as a line ending; stray CR and LF are ordinary
/// bytes. A final line without CRLF is completed with one.
pub fn canonicalize_body(algorithm: CanonicalizationAlgorithm, body: &[u8]) -> Vec<u8> {
    let mut lines: Vec<&[u8]> = body.split_str(CRLF).collect();

    // the segment after the final CRLF is empty unless the last line is open
    if matches!(lines.last(), Some(l) if l.is_empty()) {
        lines.pop();
    }

    let mut lines: Vec<Vec<u8>> = match algorithm {
        CanonicalizationAlgorithm::Simple => lines.into_iter().map(|l| l.to_vec()).collect(),
        CanonicalizationAlgorithm::Relaxed => lines.into_iter().map(relax_body_line).collect(),
    };

    while matches!(lines.last(), Some(l) if l.is_empty()) {
        lines.pop();
    }

    if lines.is_empty() {
        return match algorithm {
            CanonicalizationAlgorithm::Simple => CRLF.to_vec(),
            CanonicalizationAlgorithm::Relaxed => vec![],
        };
    }

    let mut result = Vec::with_capacity(body.len() + 2);
    for line in lines {
        result.extend(line);
        result.extend(CRLF);
    }
    result
}

fn relax_body_line(line: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(line.len());
    compress_wsp(&mut result, line);
    if result.last() == Some(&SP) {
        result.pop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BStr;

    fn headers() -> HeaderFields {
        HeaderFields::from_vec(vec![
            ("from".to_owned(), b" Good \t ".to_vec()),
            ("to".to_owned(), b" see   me".to_vec()),
            ("Date".to_owned(), b" Fri 24\r\n\tfoo".to_vec()),
            ("To".to_owned(), b" another one".to_vec()),
        ])
        .unwrap()
    }

    fn names(names: &[&str]) -> Vec<FieldName> {
        names.iter().map(|n| FieldName::new(*n).unwrap()).collect()
    }

    #[test]
    fn canonicalize_headers_relaxed_bottom_up() {
        let result = canonicalize_headers(
            CanonicalizationAlgorithm::Relaxed,
            &headers(),
            &names(&["to", "from", "to", "date"]),
        );

        assert_eq!(
            BStr::new(&result),
            "to:another one\r\nfrom:Good\r\nto:see me\r\ndate:Fri 24 foo\r\n"
        );
    }

    #[test]
    fn canonicalize_headers_simple_unchanged() {
        let result = canonicalize_headers(
            CanonicalizationAlgorithm::Simple,
            &headers(),
            &names(&["Date", "FROM"]),
        );

        assert_eq!(BStr::new(&result), "Date: Fri 24\r\n\tfoo\r\nfrom: Good \t \r\n");
    }

    #[test]
    fn canonicalize_headers_missing_and_oversigned() {
        let result = canonicalize_headers(
            CanonicalizationAlgorithm::Relaxed,
            &headers(),
            &names(&["from", "from", "subject"]),
        );

        assert_eq!(BStr::new(&result), "from:Good\r\n");
    }

    #[test]
    fn canonicalize_header_relaxed_folded() {
        let mut result = vec![];
        canonicalize_header(
            &mut result,
            CanonicalizationAlgorithm::Relaxed,
            "Subject",
            b" Is dinner\r\n   ready? \t",
        );

        assert_eq!(BStr::new(&result), "subject:Is dinner ready?");
    }

    #[test]
    fn canonicalize_headers_wsp_before_colon() {
        let headers = HeaderFields::from_vec(vec![
            ("Subject \t".to_owned(), b" hi\r\n \r\n there".to_vec()),
        ])
        .unwrap();
        let signed = names(&["subject"]);

        let simple = canonicalize_headers(CanonicalizationAlgorithm::Simple, &headers, &signed);
        let relaxed = canonicalize_headers(CanonicalizationAlgorithm::Relaxed, &headers, &signed);

        assert_eq!(BStr::new(&simple), "Subject \t: hi\r\n \r\n there\r\n");
        assert_eq!(BStr::new(&relaxed), "subject:hi there\r\n");
    }

    #[test]
    fn canonicalize_body_simple() {
        let body = canonicalize_body(
            CanonicalizationAlgorithm::Simple,
            b"well  hello \r\n\r\n what agi \r\n\r\n\r\n",
        );

        assert_eq!(BStr::new(&body), "well  hello \r\n\r\n what agi \r\n");
    }

    #[test]
    fn canonicalize_body_relaxed() {
        let body = canonicalize_body(
            CanonicalizationAlgorithm::Relaxed,
            b"well  hello \r\n\r\n what agi \r\n\r\n\r\n",
        );

        assert_eq!(BStr::new(&body), "well hello\r\n\r\n what agi\r\n");
    }

    #[test]
    fn canonicalize_body_relaxed_stray_cr() {
        let body = canonicalize_body(CanonicalizationAlgorithm::Relaxed, b"\r\n\r\n\ra \r\nb  c");

        assert_eq!(BStr::new(&body), "\r\n\r\n\ra\r\nb c\r\n");
    }

    #[test]
    fn canonicalize_body_empty() {
        // RFC 6376, sections 3.4.3 and 3.4.4
        assert_eq!(canonicalize_body(CanonicalizationAlgorithm::Simple, b""), b"\r\n");
        assert_eq!(canonicalize_body(CanonicalizationAlgorithm::Simple, b"\r\n\r\n"), b"\r\n");
        assert_eq!(canonicalize_body(CanonicalizationAlgorithm::Relaxed, b""), b"");
        assert_eq!(canonicalize_body(CanonicalizationAlgorithm::Relaxed, b" \r\n\t\r\n"), b"");
    }

    #[test]
    fn canonicalize_body_open_last_line() {
        assert_eq!(canonicalize_body(CanonicalizationAlgorithm::Simple, b"abc"), b"abc\r\n");
        assert_eq!(canonicalize_body(CanonicalizationAlgorithm::Relaxed, b"abc "), b"abc\r\n");
    }
}
