//! Multivalued key/value sets for query strings and URL-encoded forms

use crate::values::{flatten, to_text_lossy};
use serde::Serialize;
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Ordered multimap of string values.
///
/// Keys serialize in sorted order; values of one key keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values {
    inner: BTreeMap<String, Vec<String>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Appends one value to `key`
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Appends every value of `other`
    pub fn extend(&mut self, other: Values) {
        for (key, values) in other.inner {
            self.inner.entry(key).or_default().extend(values);
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.inner.get(key).map(|v| v.as_slice())
    }

    /// All pairs, keys sorted
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Percent-encoded `application/x-www-form-urlencoded` serialization
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.pairs() {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    /// Flattens a serializable object into values.
    ///
    /// `null`-like objects produce an empty set; `null` fields become empty strings.
    pub fn from_object<T: Serialize + ?Sized>(object: &T) -> Result<Self, String> {
        let mut values = Values::new();
        if let Some(pairs) = flatten(object)? {
            for (key, value) in pairs {
                values.add(key, to_text_lossy(&value));
            }
        }
        Ok(values)
    }

    /// Parses a raw query string.
    ///
    /// Rejects malformed percent escapes and `;` separators instead of
    /// guessing what the caller meant.
    pub fn parse(query: &str) -> Result<Self, String> {
        let query = query.strip_prefix('?').unwrap_or(query);
        validate_query(query)?;

        let mut values = Values::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            values.add(key.into_owned(), value.into_owned());
        }
        Ok(values)
    }
}

fn validate_query(query: &str) -> Result<(), String> {
    if query.contains(';') {
        return Err(format!("invalid semicolon separator in query {:?}", query));
    }
    let bytes = query.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3);
            let valid = matches!(escape, Some(pair) if pair.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(format!(
                    "invalid URL escape {:?} in query {:?}",
                    String::from_utf8_lossy(&bytes[i..end]),
                    query
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}
