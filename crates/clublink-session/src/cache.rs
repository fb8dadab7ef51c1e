//! Time-boxed snapshot caches.
//!
//! Entries expire lazily: nothing runs in the background, reads simply
//! skip and purge what has aged out. All methods take the current
//! instant so expiry can be tested without sleeping.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use clublink_protocol::{GroupMember, HouseId, JoinApplication, TableInfo, UserId};

use crate::SessionConfig;

/// How an entry's deadline moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Every read or write pushes the deadline out by the TTL.
    Sliding(Duration),
    /// The deadline is fixed at insertion.
    Absolute(Duration),
}

impl Expiry {
    fn ttl(self) -> Duration {
        match self {
            Self::Sliding(d) | Self::Absolute(d) => d,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    deadline: Instant,
}

/// A map whose entries expire.
#[derive(Debug, Clone)]
pub struct TtlMap<K, V> {
    expiry: Expiry,
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlMap<K, V> {
    pub fn new(expiry: Expiry) -> Self {
        Self {
            expiry,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        let deadline = now + self.expiry.ttl();
        self.entries.insert(key, Entry { value, deadline });
    }

    /// A copy of the live value for `key`.
    pub fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        if self.entries.get(key)?.deadline <= now {
            self.entries.remove(key);
            return None;
        }
        let ttl = self.expiry.ttl();
        let sliding = matches!(self.expiry, Expiry::Sliding(_));
        let e = self.entries.get_mut(key)?;
        if sliding {
            e.deadline = now + ttl;
        }
        Some(e.value.clone())
    }

    pub fn contains(&mut self, key: &K, now: Instant) -> bool {
        self.get(key, now).is_some()
    }

    /// Applies `f` to the live value for `key`. Returns `false` if there
    /// is none.
    pub fn update(&mut self, key: &K, now: Instant, f: impl FnOnce(&mut V)) -> bool {
        self.purge(now);
        let ttl = self.expiry.ttl();
        let sliding = matches!(self.expiry, Expiry::Sliding(_));
        match self.entries.get_mut(key) {
            Some(e) => {
                f(&mut e.value);
                if sliding {
                    e.deadline = now + ttl;
                }
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Drops everything and inserts `items`.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = (K, V)>, now: Instant) {
        self.entries.clear();
        for (k, v) in items {
            self.insert(k, v, now);
        }
    }

    /// Copies of every live entry, in no particular order.
    pub fn entries(&mut self, now: Instant) -> Vec<(K, V)> {
        self.purge(now);
        let ttl = self.expiry.ttl();
        let sliding = matches!(self.expiry, Expiry::Sliding(_));
        self.entries
            .iter_mut()
            .map(|(k, e)| {
                if sliding {
                    e.deadline = now + ttl;
                }
                (k.clone(), e.value.clone())
            })
            .collect()
    }

    pub fn values(&mut self, now: Instant) -> Vec<V> {
        self.entries(now).into_iter().map(|(_, v)| v).collect()
    }

    /// Live entry count. Purges first.
    pub fn len(&mut self, now: Instant) -> usize {
        self.purge(now);
        self.entries.len()
    }

    pub fn purge(&mut self, now: Instant) {
        self.entries.retain(|_, e| e.deadline > now);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The five snapshot caches of one session, plus the set of join
/// applications already answered.
#[derive(Debug)]
pub(crate) struct Caches {
    /// Keyed by table ID; mapped numbers can be renewed.
    pub tables: TtlMap<u32, TableInfo>,
    pub members: TtlMap<UserId, GroupMember>,
    /// Keyed by application ID.
    pub applications: TtlMap<u32, JoinApplication>,
    pub processed_applications: TtlMap<u32, ()>,
    pub forbidden: TtlMap<UserId, ()>,
    pub houses: TtlMap<HouseId, ()>,
}

impl Caches {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        Self {
            tables: TtlMap::new(Expiry::Sliding(config.table_ttl)),
            members: TtlMap::new(Expiry::Sliding(config.member_ttl)),
            applications: TtlMap::new(Expiry::Absolute(config.application_ttl)),
            processed_applications: TtlMap::new(Expiry::Absolute(config.application_ttl)),
            forbidden: TtlMap::new(Expiry::Absolute(config.forbidden_ttl)),
            houses: TtlMap::new(Expiry::Sliding(config.house_ttl)),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.tables.clear();
        self.members.clear();
        self.applications.clear();
        self.processed_applications.clear();
        self.forbidden.clear();
        self.houses.clear();
    }

    /// Table ID currently holding `mapped_number`.
    pub(crate) fn table_id_for(&mut self, mapped_number: u32, now: Instant) -> Option<u32> {
        self.tables
            .entries(now)
            .into_iter()
            .find(|(_, t)| t.mapped_number == mapped_number)
            .map(|(id, _)| id)
    }

    /// Stores applications that were not answered yet; returns those.
    pub(crate) fn accept_applications(
        &mut self,
        applications: Vec<JoinApplication>,
        now: Instant,
    ) -> Vec<JoinApplication> {
        let mut fresh = Vec::new();
        for app in applications {
            if self.processed_applications.contains(&app.apply_id, now) {
                continue;
            }
            self.applications.insert(app.apply_id, app.clone(), now);
            fresh.push(app);
        }
        fresh
    }

    /// Marks an application answered so a re-push does not bring it back.
    pub(crate) fn mark_processed(&mut self, apply_id: u32, now: Instant) {
        self.applications.remove(&apply_id);
        self.processed_applications.insert(apply_id, (), now);
    }

    pub(crate) fn set_forbidden(&mut self, member: UserId, forbidden: bool, now: Instant) {
        if forbidden {
            self.forbidden.insert(member, (), now);
        } else {
            self.forbidden.remove(&member);
        }
    }
}
