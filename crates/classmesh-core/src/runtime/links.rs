//! Connection map keyed by unordered endpoint pair.

use std::collections::BTreeMap;

use crate::broker::Link;

pub(crate) type PairKey = (String, String);

pub(crate) fn pair_key(a: &str, b: &str) -> PairKey {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[derive(Default)]
pub(crate) struct LinkTable {
    links: BTreeMap<PairKey, Link>,
}

impl LinkTable {
    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.links.contains_key(&pair_key(a, b))
    }

    pub fn insert(&mut self, link: Link) {
        let key = pair_key(link.initiator(), link.recipient());
        self.links.insert(key, link);
    }

    pub fn take(&mut self, a: &str, b: &str) -> Option<Link> {
        self.links.remove(&pair_key(a, b))
    }

    /// Remove and return every link touching `user`.
    pub fn take_touching(&mut self, user: &str) -> Vec<Link> {
        let keys: Vec<PairKey> = self
            .links
            .keys()
            .filter(|(a, b)| a == user || b == user)
            .cloned()
            .collect();
        keys.iter().filter_map(|k| self.links.remove(k)).collect()
    }

    pub fn take_all(&mut self) -> Vec<Link> {
        std::mem::take(&mut self.links).into_values().collect()
    }

    /// Pairs whose link is actually wired (dead links are skipped).
    pub fn alive_pairs(&self) -> impl Iterator<Item = &PairKey> {
        self.links.iter().filter(|(_, l)| l.is_alive()).map(|(k, _)| k)
    }
}
