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

//! Tag=value lists, RFC 6376, section 3.2.

use base64ct::{Base64, Encoding};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagListParseError {
    DuplicateTag,
    Syntax,
}

#[derive(Debug, Eq, PartialEq)]
pub struct TagSpec<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Eq, PartialEq)]
pub struct TagList<'a>(Vec<TagSpec<'a>>);

impl<'a> AsRef<[TagSpec<'a>]> for TagList<'a> {
    fn as_ref(&self) -> &[TagSpec<'a>] {
        &self.0
    }
}

impl<'a> TagList<'a> {
    pub fn parse(input: &'a str) -> Result<Self, TagListParseError> {
        let mut segments: Vec<_> = input.split(';').collect();

        // tag-list = tag-spec *( ";" tag-spec ) [ ";" ]
        if segments.len() > 1 && is_blank(segments[segments.len() - 1]) {
            segments.pop();
        }

        let mut tags = Vec::with_capacity(segments.len());
        let mut names_seen = HashSet::new();

        for segment in segments {
            let tag = parse_tag_spec(segment).ok_or(TagListParseError::Syntax)?;
            if !names_seen.insert(tag.name) {
                return Err(TagListParseError::DuplicateTag);
            }
            tags.push(tag);
        }

        Ok(Self(tags))
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.0.iter().find(|tag| tag.name == name).map(|tag| tag.value)
    }
}

fn parse_tag_spec(segment: &str) -> Option<TagSpec<'_>> {
    if !is_well_formed_fws(segment) {
        return None;
    }

    let (name, value) = segment.split_once('=')?;

    let name = trim_fws(name);
    let value = trim_fws(value);

    if !is_tag_name(name) || !is_tag_value(value) {
        return None;
    }

    Some(TagSpec { name, value })
}

fn is_fws_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn trim_fws(s: &str) -> &str {
    s.trim_matches(is_fws_char)
}

fn is_blank(s: &str) -> bool {
    s.chars().all(is_fws_char)
}

// CR and LF may occur only as CRLF followed by WSP.
fn is_well_formed_fws(s: &str) -> bool {
    let mut lines = s.split("\r\n");
    let first_ok = matches!(lines.next(), Some(l) if !l.contains(['\r', '\n']));
    first_ok && lines.all(|l| l.starts_with([' ', '\t']) && !l.contains(['\r', '\n']))
}

fn is_tag_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_tag_value(s: &str) -> bool {
    s.chars().all(|c| is_tval_char(c) || is_fws_char(c))
}

/// Printable ASCII except `;`, or any non-ASCII character.
pub fn is_tval_char(c: char) -> bool {
    matches!(c, '!'..=':' | '<'..='~') || !c.is_ascii()
}

pub fn strip_fws_from_tag_value(value: &str) -> String {
    value.chars().filter(|&c| !is_fws_char(c)).collect()
}

pub fn parse_colon_separated_tag_value(value: &str) -> Vec<&str> {
    value.split(':').map(trim_fws).collect()
}

pub fn parse_base64_tag_value(value: &str) -> Result<Vec<u8>, TagListParseError> {
    let value = strip_fws_from_tag_value(value);
    Base64::decode_vec(&value).map_err(|_| TagListParseError::Syntax)
}
