// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Domain names and their hierarchy operations.
//!
//! Throughout the crate, domain names are kept in a single normalized
//! form: ASCII lowercase with a trailing label separator, e.g.
//! `www.example.com.`. The root is the bare separator `.`. The [`Name`]
//! type upholds this invariant at construction, so the rest of the code
//! can compare names with plain string equality and derive hierarchy
//! relations from label suffixes.

use std::fmt;
use std::str::FromStr;

////////////////////////////////////////////////////////////////////////
// NAMES                                                              //
////////////////////////////////////////////////////////////////////////

/// A validated, normalized domain name.
///
/// A `Name` is always lowercase and always ends with the label
/// separator `.`. Labels are non-empty runs of `[a-z0-9-]`. The root
/// name is `.` and has zero labels.
#[derive(Clone, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Name(Box<str>);

impl Name {
    /// Returns the root name, `.`.
    pub fn root() -> Self {
        Self(Box::from("."))
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        &*self.0 == "."
    }

    /// Returns the normalized textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the number of labels. The root has zero labels;
    /// `example.com.` has two.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Iterates over the labels from left (most specific) to right.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|l| !l.is_empty())
    }

    /// Returns whether `self` lies at or below `ancestor` in the
    /// hierarchy.
    ///
    /// Every name is a subdomain of the root, and every name is a
    /// subdomain of itself.
    pub fn is_subdomain_of(&self, ancestor: &Name) -> bool {
        if ancestor.is_root() {
            return true;
        }
        match self.0.len().checked_sub(ancestor.0.len()) {
            None => false,
            Some(0) => self.0 == ancestor.0,
            Some(boundary) => {
                self.0.ends_with(&*ancestor.0) && self.0.as_bytes()[boundary - 1] == b'.'
            }
        }
    }
}

impl FromStr for Name {
    type Err = NameError;

    /// Parses and normalizes a domain name. The trailing separator may
    /// be omitted in the input; uppercase ASCII is folded to lowercase.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.is_empty() {
            return Err(NameError::Empty);
        }
        if text == "." {
            return Ok(Self::root());
        }

        let mut normalized = text.to_ascii_lowercase();
        if !normalized.ends_with('.') {
            normalized.push('.');
        }

        for label in normalized[..normalized.len() - 1].split('.') {
            if label.is_empty() {
                return Err(NameError::EmptyLabel);
            }
            for c in label.chars() {
                if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                    return Err(NameError::InvalidChar(c));
                }
            }
        }

        Ok(Self(normalized.into_boxed_str()))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a string is not a valid domain name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NameError {
    Empty,
    EmptyLabel,
    InvalidChar(char),
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Empty => f.write_str("empty domain name"),
            Self::EmptyLabel => f.write_str("empty label in domain name"),
            Self::InvalidChar(c) => write!(f, "invalid character {c:?} in domain name"),
        }
    }
}

impl std::error::Error for NameError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    #[test]
    fn parsing_normalizes() {
        assert_eq!(name("Example.COM").as_str(), "example.com.");
        assert_eq!(name("example.com.").as_str(), "example.com.");
        assert_eq!(name(".").as_str(), ".");
    }

    #[test]
    fn parsing_rejects_bad_names() {
        assert_eq!("".parse::<Name>(), Err(NameError::Empty));
        assert_eq!("a..b".parse::<Name>(), Err(NameError::EmptyLabel));
        assert_eq!(".example.".parse::<Name>(), Err(NameError::EmptyLabel));
        assert_eq!(
            "exa mple.com".parse::<Name>(),
            Err(NameError::InvalidChar(' ')),
        );
        assert_eq!(
            "exa_mple.com".parse::<Name>(),
            Err(NameError::InvalidChar('_')),
        );
    }

    #[test]
    fn label_counts() {
        assert_eq!(name(".").label_count(), 0);
        assert_eq!(name("com.").label_count(), 1);
        assert_eq!(name("www.example.com.").label_count(), 3);
    }

    #[test]
    fn subdomain_relations() {
        assert!(name("example.com.").is_subdomain_of(&name(".")));
        assert!(name("example.com.").is_subdomain_of(&name("com.")));
        assert!(name("example.com.").is_subdomain_of(&name("example.com.")));
        assert!(!name("example.com.").is_subdomain_of(&name("example.org.")));
        assert!(!name("com.").is_subdomain_of(&name("example.com.")));

        // A label suffix is not enough: the boundary must fall on a
        // separator.
        assert!(!name("notexample.com.").is_subdomain_of(&name("example.com.")));
    }
}
