//! # Core Utilities

pub mod generate;

use serde::{Deserialize, Serialize};

/// `Quota` allows serde to serialize/deserialize a single object or a set of
/// objects.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Quota<T> {
    /// Single object
    One(T),

    /// Set of objects
    Many(Vec<T>),
}

impl<T: Default> Default for Quota<T> {
    fn default() -> Self {
        Self::One(T::default())
    }
}

impl<T> Quota<T> {
    /// Returns the length of the quota.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(many) => many.len(),
        }
    }

    /// Returns `true` if the quota is an empty `Many`.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Many(many) => many.is_empty(),
        }
    }

    /// Iterate over the contained objects.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::One(one) => std::slice::from_ref(one).iter(),
            Self::Many(many) => many.iter(),
        }
    }
}

impl<T> From<Quota<T>> for Vec<T> {
    fn from(quota: Quota<T>) -> Self {
        match quota {
            Quota::One(one) => vec![one],
            Quota::Many(many) => many,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_or_many() {
        let one: Quota<String> = serde_json::from_str(r#""a~""#).expect("should deserialize");
        assert_eq!(one.len(), 1);

        let many: Quota<String> =
            serde_json::from_str(r#"["a~", "b~"]"#).expect("should deserialize");
        assert_eq!(many.iter().cloned().collect::<Vec<_>>(), vec!["a~", "b~"]);
    }
}
