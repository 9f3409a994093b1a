//! Primary-key reconciliation across sources.
//!
//! ESPN hands out numeric ids that live in the same space as our keys, so they
//! are reused as-is. Every other source family gets a three-digit decimal
//! prefix and a twelve-digit local part:
//!
//! ```text
//!   id = prefix * 10^12 + local        (local < 10^12)
//! ```
//!
//! The local part is the upstream number when the natural key is numeric, and
//! a truncated SHA-256 of the key otherwise. Prefixed ranges never overlap each
//! other or the reused ESPN range `1..10^12`.

use std::ops::Range;

use sha2::{Digest, Sha256};

use crate::error::IdError;

/// Width of the local part of a namespaced id.
pub const LOCAL_SPAN: u64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// ESPN site/web APIs. Upstream ids reused.
    Espn,
    /// KBO baseball: Naver schedule feed and koreabaseball.com.
    Kbo,
    /// KBL basketball: kbl.or.kr.
    Kbl,
    /// K League football: Naver schedule feed and kleague.com.
    Kleague,
}

impl Namespace {
    pub const fn prefix(self) -> Option<u64> {
        match self {
            Namespace::Espn => None,
            Namespace::Kbo => Some(700),
            Namespace::Kbl => Some(800),
            Namespace::Kleague => Some(900),
        }
    }

    /// Half-open id range owned by this namespace.
    pub const fn range(self) -> Range<i64> {
        match self.prefix() {
            None => 1..LOCAL_SPAN as i64,
            Some(p) => (p * LOCAL_SPAN) as i64..((p + 1) * LOCAL_SPAN) as i64,
        }
    }

    pub fn contains(self, id: i64) -> bool {
        self.range().contains(&id)
    }

    /// Id for an upstream identifier that must be numeric.
    pub fn from_numeric(self, raw: &str) -> Result<i64, IdError> {
        let local = parse_local(raw)?;
        self.compose(local)
    }

    /// Id for any natural key: numeric keys map to themselves, everything
    /// else is hashed. ESPN keys must be numeric.
    pub fn from_key(self, key: &str) -> Result<i64, IdError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(IdError::Empty);
        }
        match self.prefix() {
            None => self.from_numeric(key),
            Some(_) => {
                let local = match parse_local(key) {
                    Ok(n) => n,
                    Err(_) => hashed_local(key),
                };
                self.compose(local)
            }
        }
    }

    /// Upstream number behind a namespaced id, e.g. to rebuild a profile URL.
    pub fn local_part(self, id: i64) -> Option<u64> {
        if !self.contains(id) {
            return None;
        }
        match self.prefix() {
            None => Some(id as u64),
            Some(p) => Some(id as u64 - p * LOCAL_SPAN),
        }
    }

    fn compose(self, local: u64) -> Result<i64, IdError> {
        match self.prefix() {
            None if local == 0 || local >= LOCAL_SPAN => Err(IdError::OutOfRange(local)),
            None => Ok(local as i64),
            Some(_) if local >= LOCAL_SPAN => Err(IdError::OutOfRange(local)),
            Some(p) => Ok((p * LOCAL_SPAN + local) as i64),
        }
    }
}

fn parse_local(raw: &str) -> Result<u64, IdError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdError::NotNumeric(raw.to_string()));
    }
    // All digits, so the only failure left is overflow.
    raw.parse::<u64>().map_err(|_| IdError::OutOfRange(u64::MAX))
}

/// First eight bytes of SHA-256, folded into the local span.
pub fn hashed_local(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % LOCAL_SPAN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_code_same_id() {
        let a = Namespace::Kleague.from_key("05").unwrap();
        let b = Namespace::Kleague.from_key("05").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 900_000_000_000_005);
    }

    #[test]
    fn hashed_keys_are_stable() {
        let a = Namespace::Kbo.from_key("두산 베어스").unwrap();
        let b = Namespace::Kbo.from_key("  두산 베어스 ").unwrap();
        assert_eq!(a, b);
        assert!(Namespace::Kbo.contains(a));
        assert_ne!(a, Namespace::Kbo.from_key("LG 트윈스").unwrap());
    }

    #[test]
    fn namespaces_do_not_collide() {
        for key in ["1", "05", "20240501OBLT02024", "서울 SK 나이츠"] {
            let kbo = Namespace::Kbo.from_key(key).unwrap();
            let kbl = Namespace::Kbl.from_key(key).unwrap();
            let kl = Namespace::Kleague.from_key(key).unwrap();
            assert_ne!(kbo, kbl);
            assert_ne!(kbl, kl);
            assert_ne!(kbo, kl);
            assert!(!Namespace::Espn.contains(kbo));
        }
    }

    #[test]
    fn espn_ids_are_reused() {
        assert_eq!(Namespace::Espn.from_numeric("401547").unwrap(), 401547);
        assert_eq!(Namespace::Espn.from_key(" 17 ").unwrap(), 17);
        assert_eq!(
            Namespace::Espn.from_key("abc"),
            Err(IdError::NotNumeric("abc".into()))
        );
        assert_eq!(Namespace::Espn.from_numeric("0"), Err(IdError::OutOfRange(0)));
    }

    #[test]
    fn malformed_keys_fail() {
        assert_eq!(Namespace::Kbo.from_key("   "), Err(IdError::Empty));
        assert_eq!(Namespace::Kbo.from_numeric("12a"), Err(IdError::NotNumeric("12a".into())));
        assert!(matches!(
            Namespace::Kbl.from_numeric("1000000000000"),
            Err(IdError::OutOfRange(_))
        ));
    }

    #[test]
    fn local_part_round_trips() {
        let id = Namespace::Kbo.from_numeric("67001").unwrap();
        assert_eq!(Namespace::Kbo.local_part(id), Some(67001));
        assert_eq!(Namespace::Kleague.local_part(id), None);
    }
}
