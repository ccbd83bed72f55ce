//! Tagged payload encoding for nested ordered maps and sets.
//!
//! Payloads are JSON text. Plain JSON objects cannot tell a struct from a
//! map, and arrays cannot tell a list from a set, so map and set fields are
//! written in an explicit tagged form:
//!
//! ```text
//! {"kind":"map","entries":[["ran",1],["jumped",2]]}
//! {"kind":"set","entries":["a\u001fb\u001fc"]}
//! ```
//!
//! Use [`tagged_map`] and [`tagged_set`] as `#[serde(with = "...")]` adapters.
//! Decoding rebuilds `BTreeMap` / `BTreeSet`; a payload whose `kind` does not
//! match the field is a decode error.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Structure tag written next to the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Map,
    Set,
}

#[derive(Serialize)]
struct TaggedOut<E> {
    kind: Kind,
    entries: E,
}

#[derive(Deserialize)]
struct TaggedIn<E> {
    kind: Kind,
    entries: Vec<E>,
}

/// Serialize a value to its stored text form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Parse a stored payload back into a value.
pub fn decode<T: DeserializeOwned>(payload: &str) -> Result<T> {
    Ok(serde_json::from_str(payload)?)
}

/// Serde adapter for `BTreeMap<K, V>` as `{"kind":"map","entries":[[k,v],...]}`.
pub mod tagged_map {
    use super::{Kind, TaggedIn, TaggedOut};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        let entries: Vec<(&K, &V)> = map.iter().collect();
        TaggedOut {
            kind: Kind::Map,
            entries,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let tagged = TaggedIn::<(K, V)>::deserialize(deserializer)?;
        if tagged.kind != Kind::Map {
            return Err(D::Error::custom("expected a tagged map payload"));
        }
        Ok(tagged.entries.into_iter().collect())
    }
}

/// Serde adapter for `BTreeSet<T>` as `{"kind":"set","entries":[...]}`.
pub mod tagged_set {
    use super::{Kind, TaggedIn, TaggedOut};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeSet;

    pub fn serialize<T, S>(set: &BTreeSet<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        let entries: Vec<&T> = set.iter().collect();
        TaggedOut {
            kind: Kind::Set,
            entries,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<BTreeSet<T>, D::Error>
    where
        T: Deserialize<'de> + Ord,
        D: Deserializer<'de>,
    {
        let tagged = TaggedIn::<T>::deserialize(deserializer)?;
        if tagged.kind != Kind::Set {
            return Err(D::Error::custom("expected a tagged set payload"));
        }
        Ok(tagged.entries.into_iter().collect())
    }
}
