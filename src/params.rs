//! Path parameters extracted during matching.

use std::str::FromStr;

use crate::error::ValidationError;

/// An ordered mapping from parameter name to the raw path segment it matched.
///
/// Produced once per request by the route table (or by a sink's named capture
/// groups) and handed by reference to every hook, the responder and any error
/// handler. Order follows the template, left to right.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the value for `name`, if the template declared it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parses the value for `name` into `T`.
    ///
    /// A missing parameter or an unparsable value is a [`ValidationError`],
    /// which the default error mapping turns into `400 Bad Request`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, ValidationError> {
        let raw = self.get(name).ok_or_else(|| ValidationError::Missing {
            name: name.to_owned(),
        })?;
        raw.parse().map_err(|_| ValidationError::Invalid {
            name: name.to_owned(),
            value: raw.to_owned(),
            expected: std::any::type_name::<T>(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}
