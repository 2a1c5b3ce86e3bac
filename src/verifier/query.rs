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

use crate::{
    signature::{DomainName, Selector},
    verifier::{LookupTxt, VerifierError},
};
use std::{
    io::{self, ErrorKind},
    time::Duration,
};
use tokio::time;
use tracing::trace;

// RFC 6376, section 6.1.2 allows trying several records; a few are enough.
const MAX_KEY_RECORDS: usize = 3;

/// Returns the query name for a key record, `<selector>._domainkey.<domain>.`
pub fn key_record_name(domain: &DomainName, selector: &Selector) -> String {
    // absolute queries only
    format!("{}._domainkey.{}.", selector.to_ascii(), domain.to_ascii())
}

/// Looks up the TXT records for a domain and selector, within `timeout`.
///
/// On success, at least one record is returned. Records that are not valid
/// UTF-8 are returned as `ErrorKind::InvalidData` errors.
pub async fn look_up_records<T: LookupTxt + ?Sized>(
    resolver: &T,
    domain: &DomainName,
    selector: &Selector,
    timeout: Duration,
) -> Result<Vec<io::Result<String>>, VerifierError> {
    let name = key_record_name(domain, selector);

    trace!(%name, "looking up key record");

    let answer = match time::timeout(timeout, resolver.lookup_txt(&name)).await {
        Ok(answer) => answer,
        Err(_) => Err(ErrorKind::TimedOut.into()),
    };

    let txts = answer.map_err(|e| classify_lookup_error(&e))?;

    let txts: Vec<_> = txts
        .into_iter()
        .take(MAX_KEY_RECORDS)
        .map(|txt| {
            txt.and_then(|bytes| {
                String::from_utf8(bytes).map_err(|_| io::Error::from(ErrorKind::InvalidData))
            })
        })
        .collect();

    if txts.is_empty() {
        trace!(%name, "no key record");
        return Err(VerifierError::NoKeyFound);
    }

    Ok(txts)
}

fn classify_lookup_error(e: &io::Error) -> VerifierError {
    match e.kind() {
        ErrorKind::NotFound => {
            trace!("no key record");
            VerifierError::NoKeyFound
        }
        ErrorKind::InvalidInput => {
            trace!("invalid key record domain name");
            VerifierError::InvalidKeyDomain
        }
        ErrorKind::TimedOut => {
            trace!("key record lookup timed out");
            VerifierError::KeyLookupTimeout
        }
        _ => {
            trace!("could not look up key record: {e}");
            VerifierError::KeyLookup
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{future::Future, pin::Pin};

    struct MockLookupTxt;

    impl LookupTxt for MockLookupTxt {
        type Answer = Vec<io::Result<Vec<u8>>>;
        type Query<'a> = Pin<Box<dyn Future<Output = io::Result<Self::Answer>> + Send + 'a>>;

        fn lookup_txt(&self, domain: &str) -> Self::Query<'_> {
            let domain = domain.to_owned();

            Box::pin(async move {
                match domain.as_str() {
                    "sel._domainkey.example.com." => Ok(vec![
                        Ok(b"one".to_vec()),
                        Ok(b"two\xff".to_vec()),
                        Err(ErrorKind::Unsupported.into()),
                        Ok(b"four".to_vec()),
                    ]),
                    "empty._domainkey.example.com." => Ok(vec![]),
                    "slow._domainkey.example.com." => {
                        time::sleep(Duration::from_secs(60)).await;
                        Ok(vec![])
                    }
                    "broken._domainkey.example.com." => Err(ErrorKind::ConnectionReset.into()),
                    _ => Err(ErrorKind::NotFound.into()),
                }
            })
        }
    }

    fn names(domain: &str, selector: &str) -> (DomainName, Selector) {
        (DomainName::new(domain).unwrap(), Selector::new(selector).unwrap())
    }

    #[test]
    fn key_record_name_a_labels() {
        let (d, s) = names("Example.中国", "sel");

        assert_eq!(key_record_name(&d, &s), "sel._domainkey.example.xn--fiqs8s.");
    }

    #[tokio::test]
    async fn look_up_records_ok() {
        let (d, s) = names("example.com", "sel");

        let txts = look_up_records(&MockLookupTxt, &d, &s, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(txts.len(), 3);
        assert_eq!(txts[0].as_ref().unwrap(), "one");
        assert_eq!(txts[1].as_ref().unwrap_err().kind(), ErrorKind::InvalidData);
        assert_eq!(txts[2].as_ref().unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn look_up_records_errors() {
        let timeout = Duration::from_secs(5);

        let (d, s) = names("example.com", "empty");
        let e = look_up_records(&MockLookupTxt, &d, &s, timeout).await.unwrap_err();
        assert_eq!(e, VerifierError::NoKeyFound);

        let (d, s) = names("example.org", "sel");
        let e = look_up_records(&MockLookupTxt, &d, &s, timeout).await.unwrap_err();
        assert_eq!(e, VerifierError::NoKeyFound);

        let (d, s) = names("example.com", "broken");
        let e = look_up_records(&MockLookupTxt, &d, &s, timeout).await.unwrap_err();
        assert_eq!(e, VerifierError::KeyLookup);
    }

    #[tokio::test(start_paused = true)]
    async fn look_up_records_timeout() {
        let (d, s) = names("example.com", "slow");

        let e = look_up_records(&MockLookupTxt, &d, &s, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(e, VerifierError::KeyLookupTimeout);
    }
}
