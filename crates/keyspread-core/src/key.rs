//! Storage keys and key-layout strategies.
//!
//! A range-sharded store splits its key space into contiguous ranges. Which
//! range a write lands in is decided entirely by its storage key, so the key
//! layout decides whether concurrent inserts spread out or pile onto one
//! range. The four strategies here are the layouts the benchmark compares:
//!
//! | Strategy | Primary key | Secondary key | Ordering kept |
//! |---|---|---|---|
//! | Natural | natural id | - | natural id |
//! | Composite | (author, natural id) | - | per author |
//! | Hashed | hash(natural id) | - | none |
//! | DecoupledWithUniqueIndex | random | natural id (index table) | none |

use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::error::EncodingError;
use crate::record::Record;

/// Separator used when a key is rendered as a single string.
///
/// The rendered form orders like the tuple as long as no leading part is
/// another leading part extended by a character below `/`. UUID ids contain
/// `-`, which does, so only the author goes in front; authors are lowercase
/// letters.
pub const KEY_SEPARATOR: char = '/';

/// Number of hex characters kept from the SHA-256 digest (128 bits).
const HASHED_KEY_HEX_LEN: usize = 32;

/// An ordered tuple of key parts.
///
/// Ordering is lexicographic over the parts, which is exactly the ordering a
/// store applies to a multi-column primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey(Vec<String>);

impl StorageKey {
    pub fn single(part: impl Into<String>) -> Self {
        Self(vec![part.into()])
    }

    pub fn composite<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Leading key part, the one that decides range placement.
    pub fn first(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    /// Single-string rendering, parts joined by [`KEY_SEPARATOR`].
    pub fn encoded(&self) -> String {
        let mut out = String::new();
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(KEY_SEPARATOR);
            }
            out.push_str(part);
        }
        out
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}

/// Well-mixed, non-reversible key for a natural id: truncated hex SHA-256.
pub fn hashed_key(natural_id: &str) -> String {
    let digest = Sha256::digest(natural_id.as_bytes());
    let mut out = String::with_capacity(HASHED_KEY_HEX_LEN);
    for byte in digest.iter().take(HASHED_KEY_HEX_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Keys derived for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    pub primary: StorageKey,
    /// Key of the unique-index row, for strategies that need one.
    pub secondary: Option<StorageKey>,
}

/// How a record's storage key is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStrategy {
    /// Key is the natural id. Hotspot-prone whenever ids are correlated in time.
    Natural,
    /// Key is `(author, id)`. Groups each author's writes together.
    Composite,
    /// Key is a hash of the natural id, which stays in the row as payload.
    Hashed,
    /// Key is random; a unique index row maps the natural id to it.
    DecoupledWithUniqueIndex,
}

impl KeyStrategy {
    pub const ALL: [KeyStrategy; 4] = [
        KeyStrategy::Natural,
        KeyStrategy::Composite,
        KeyStrategy::Hashed,
        KeyStrategy::DecoupledWithUniqueIndex,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            KeyStrategy::Natural => "natural",
            KeyStrategy::Composite => "composite",
            KeyStrategy::Hashed => "hashed",
            KeyStrategy::DecoupledWithUniqueIndex => "decoupled-unique-index",
        }
    }

    /// Whether a primary-key range scan returns records in natural id order.
    pub fn preserves_natural_order(&self) -> bool {
        matches!(self, KeyStrategy::Natural)
    }

    /// Derive the storage key(s) for a record.
    ///
    /// `DecoupledWithUniqueIndex` draws a fresh random primary key on every
    /// call; the other strategies are pure functions of the record.
    pub fn derive(&self, record: &Record) -> Result<DerivedKeys, EncodingError> {
        if record.id.is_empty() {
            return Err(EncodingError::invalid("id", "must not be empty"));
        }
        let keys = match self {
            KeyStrategy::Natural => DerivedKeys {
                primary: StorageKey::single(record.id.as_str()),
                secondary: None,
            },
            KeyStrategy::Composite => DerivedKeys {
                primary: StorageKey::composite([record.author.as_str(), record.id.as_str()]),
                secondary: None,
            },
            KeyStrategy::Hashed => DerivedKeys {
                primary: StorageKey::single(hashed_key(&record.id)),
                secondary: None,
            },
            KeyStrategy::DecoupledWithUniqueIndex => DerivedKeys {
                primary: StorageKey::single(Uuid::new_v4().to_string()),
                secondary: Some(StorageKey::single(record.id.as_str())),
            },
        };
        Ok(keys)
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_record;

    #[test]
    fn test_hashed_key_shape() {
        let key = hashed_key("record-1");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(key, hashed_key("record-1"));
        assert_ne!(key, hashed_key("record-2"));
    }

    #[test]
    fn test_composite_keys_group_by_author() {
        let authors = ["ruby", "dia", "gold", "dia", "ruby", "gold", "dia"];
        let mut keys: Vec<StorageKey> = authors
            .iter()
            .enumerate()
            .map(|(i, author)| {
                let record = sample_record(&format!("{:08x}", 1000 - i), author);
                KeyStrategy::Composite.derive(&record).unwrap().primary
            })
            .collect();
        keys.sort();

        // Once an author's run ends it never reappears.
        let mut finished: Vec<&str> = Vec::new();
        let mut current = "";
        for key in &keys {
            let author = key.first();
            if author != current {
                assert!(!finished.contains(&author), "author {author} not contiguous");
                if !current.is_empty() {
                    finished.push(current);
                }
                current = author;
            }
        }
    }

    #[test]
    fn test_composite_encoding_orders_like_tuple() {
        let a = StorageKey::composite(["dia", "zzz"]);
        let b = StorageKey::composite(["diamond", "aaa"]);
        assert!(a < b);
        assert!(a.encoded() < b.encoded());
        assert_eq!(a.to_string(), "dia/zzz");

        // '-' sorts below the separator, so such a leading part breaks the order.
        let c = StorageKey::composite(["dia-x", "aaa"]);
        assert!(a < c);
        assert!(a.encoded() > c.encoded());
    }

    #[test]
    fn test_decoupled_keys() {
        let record = sample_record("natural-9", "silver");
        let first = KeyStrategy::DecoupledWithUniqueIndex.derive(&record).unwrap();
        let second = KeyStrategy::DecoupledWithUniqueIndex.derive(&record).unwrap();

        assert_eq!(first.secondary, Some(StorageKey::single("natural-9")));
        assert_ne!(first.primary, StorageKey::single("natural-9"));
        assert_ne!(first.primary, second.primary);
    }

    #[test]
    fn test_natural_and_hashed_keys() {
        let record = sample_record("natural-10", "gold");
        let natural = KeyStrategy::Natural.derive(&record).unwrap();
        let hashed = KeyStrategy::Hashed.derive(&record).unwrap();

        assert_eq!(natural.primary, StorageKey::single("natural-10"));
        assert_eq!(hashed.primary, StorageKey::single(hashed_key("natural-10")));
        assert!(natural.secondary.is_none() && hashed.secondary.is_none());
    }

    #[test]
    fn test_empty_id_rejected() {
        let record = sample_record("", "gold");
        for strategy in KeyStrategy::ALL {
            assert!(strategy.derive(&record).is_err(), "{strategy} accepted empty id");
        }
    }
}
