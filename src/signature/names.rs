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

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseDomainError;

impl Display for ParseDomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse domain name")
    }
}

impl Error for ParseDomainError {}

/// A domain name, as used in the d= tag.
///
/// The name is kept as given; an A-label form is computed once on construction
/// and is what equality and DNS queries use.
#[derive(Clone, Eq)]
pub struct DomainName {
    name: Box<str>,
    ascii: Box<str>,
}

impl DomainName {
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        let ascii = to_ascii_name(s).ok_or(ParseDomainError)?;

        if !is_valid_dns_name(&ascii) {
            return Err(ParseDomainError);
        }

        Ok(Self {
            name: s.into(),
            ascii: ascii.into(),
        })
    }

    /// Returns the A-label (ASCII) form of this domain name.
    pub fn to_ascii(&self) -> &str {
        &self.ascii
    }

    pub fn eq_or_subdomain_of(&self, other: &DomainName) -> bool {
        let name = &self.ascii;
        let other = &other.ascii;

        if name.eq_ignore_ascii_case(other) {
            return true;
        }

        name.len() > other.len() && {
            let len = name.len() - other.len();
            matches!(name.get(len..), Some(s) if s.eq_ignore_ascii_case(other))
                && matches!(name.get(..len), Some(s) if s.ends_with('.'))
        }
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.name)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.ascii.eq_ignore_ascii_case(&other.ascii)
    }
}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ascii.to_ascii_lowercase().hash(state);
    }
}

/// A selector, as used in the s= tag.
#[derive(Clone, Eq)]
pub struct Selector {
    name: Box<str>,
    ascii: Box<str>,
}

impl Selector {
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        let ascii = to_ascii_name(s).ok_or(ParseDomainError)?;

        // lenient: selectors such as "dkim_2023" are common in the wild
        if !ascii.split('.').all(|l| is_label(l, true)) {
            return Err(ParseDomainError);
        }

        Ok(Self {
            name: s.into(),
            ascii: ascii.into(),
        })
    }

    pub fn to_ascii(&self) -> &str {
        &self.ascii
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.name)
    }
}

impl AsRef<str> for Selector {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.ascii.eq_ignore_ascii_case(&other.ascii)
    }
}

impl Hash for Selector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ascii.to_ascii_lowercase().hash(state);
    }
}

/// An agent or user identifier, as used in the i= tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    // [ Local-part ] "@" domain-name
    pub local_part: Option<Box<str>>,
    pub domain_part: DomainName,
}

impl Identity {
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        let (local_part, domain) = s.rsplit_once('@').ok_or(ParseDomainError)?;

        let local_part = if local_part.is_empty() {
            None
        } else if is_local_part(local_part) {
            Some(local_part.into())
        } else {
            return Err(ParseDomainError);
        };

        let domain_part = DomainName::new(domain)?;

        Ok(Self {
            local_part,
            domain_part,
        })
    }

    pub fn from_domain(domain_part: DomainName) -> Self {
        Self {
            local_part: None,
            domain_part,
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(local_part) = &self.local_part {
            f.write_str(local_part)?;
        }
        write!(f, "@{}", self.domain_part)
    }
}

fn to_ascii_name(s: &str) -> Option<String> {
    if s.is_empty() || s.ends_with('.') {
        return None;
    }
    idna::domain_to_ascii(s).ok()
}

fn is_valid_dns_name(s: &str) -> bool {
    if !matches!(s.len(), 1..=253) {
        return false;
    }

    let mut labels = s.rsplit('.');

    // the top-level label must not be all-numeric, and a bare TLD is not enough
    let tld_ok = matches!(
        labels.next(),
        Some(tld) if is_label(tld, false) && !tld.chars().all(|c| c.is_ascii_digit())
    );
    let mut labels = labels.peekable();

    tld_ok && labels.peek().is_some() && labels.all(|l| is_label(l, false))
}

fn is_label(s: &str, allow_underscore: bool) -> bool {
    matches!(s.len(), 1..=63)
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || (allow_underscore && c == '_'))
}

// RFC 5321, section 4.1.2, with the internationalisation of RFC 6531.
fn is_local_part(s: &str) -> bool {
    if s.len() > 64 {
        return false;
    }

    if let Some(quoted) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        is_quoted_content(quoted)
    } else {
        is_dot_string(s)
    }
}

fn is_quoted_content(s: &str) -> bool {
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            if !(c == ' ' || c.is_ascii_graphic()) {
                return false;
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if !(c == ' ' || (c.is_ascii_graphic() && c != '"') || !c.is_ascii()) {
            return false;
        }
    }
    !escaped
}

fn is_dot_string(s: &str) -> bool {
    fn is_atext(c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
                | '`' | '{' | '|' | '}' | '~'
            )
            || !c.is_ascii()
    }

    !s.is_empty() && s.split('.').all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}
