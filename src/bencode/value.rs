//! Decoded bencode values

use serde_json::{Map, Number, Value as JsonValue};

/// A decoded bencode value
///
/// Dictionaries keep their keys in the order they were read. Byte strings
/// stay raw bytes; piece hashes and compact peer lists are not text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BencodeDict),
}

/// Insertion-ordered dictionary with unique byte-string keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BencodeDict {
    entries: Vec<(Vec<u8>, BencodeValue)>,
}

impl BencodeDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, replacing the value in place if the key already exists
    pub fn insert(&mut self, key: Vec<u8>, value: BencodeValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &BencodeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|(k, _)| k.as_slice())
    }
}

impl BencodeValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string as UTF-8 text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BencodeDict> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Short name of the value kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            BencodeValue::Integer(_) => "integer",
            BencodeValue::Bytes(_) => "string",
            BencodeValue::List(_) => "list",
            BencodeValue::Dict(_) => "dictionary",
        }
    }

    /// Render as JSON. Byte strings become (lossy) UTF-8 strings and
    /// dictionaries keep their original key order.
    pub fn to_json(&self) -> JsonValue {
        match self {
            BencodeValue::Integer(i) => JsonValue::Number(Number::from(*i)),
            BencodeValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            BencodeValue::List(items) => JsonValue::Array(items.iter().map(|v| v.to_json()).collect()),
            BencodeValue::Dict(dict) => {
                let mut map = Map::new();
                for (k, v) in dict.iter() {
                    map.insert(String::from_utf8_lossy(k).into_owned(), v.to_json());
                }
                JsonValue::Object(map)
            }
        }
    }
}

impl From<&str> for BencodeValue {
    fn from(s: &str) -> Self {
        BencodeValue::Bytes(s.as_bytes().to_vec())
    }
}

impl From<i64> for BencodeValue {
    fn from(i: i64) -> Self {
        BencodeValue::Integer(i)
    }
}
