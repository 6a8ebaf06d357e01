use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// In-process tier holding the same serialized entries as the shared tier.
pub(super) struct LocalTier {
    slots: DashMap<String, LocalSlot>,
    max_entries: usize,
}

struct LocalSlot {
    encoded: String,
    hard_expiry_ms: i64,
}

impl LocalTier {
    pub(super) fn new(max_entries: usize) -> Self {
        Self {
            slots: DashMap::new(),
            max_entries,
        }
    }

    /// Returns the encoded entry unless it is past hard expiry.
    pub(super) fn get(&self, key: &str, now_ms: i64) -> Option<String> {
        let expired = match self.slots.get(key) {
            Some(slot) if slot.hard_expiry_ms > now_ms => return Some(slot.encoded.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.slots
                .remove_if(key, |_, slot| slot.hard_expiry_ms <= now_ms);
        }

        None
    }

    pub(super) fn insert(&self, key: &str, encoded: String, hard_expiry_ms: i64, now_ms: i64) {
        self.make_room(now_ms);
        self.slots.insert(
            key.to_owned(),
            LocalSlot {
                encoded,
                hard_expiry_ms,
            },
        );
    }

    /// Inserts only when no live entry exists.
    pub(super) fn insert_if_vacant(
        &self,
        key: &str,
        encoded: String,
        hard_expiry_ms: i64,
        now_ms: i64,
    ) {
        self.make_room(now_ms);
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().hard_expiry_ms <= now_ms {
                    occupied.insert(LocalSlot {
                        encoded,
                        hard_expiry_ms,
                    });
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LocalSlot {
                    encoded,
                    hard_expiry_ms,
                });
            }
        }
    }

    pub(super) fn remove(&self, key: &str) {
        self.slots.remove(key);
    }

    fn make_room(&self, now_ms: i64) {
        if self.slots.len() < self.max_entries {
            return;
        }

        self.slots.retain(|_, slot| slot.hard_expiry_ms > now_ms);
        let size = self.slots.len();
        if size < self.max_entries {
            return;
        }

        let victims: Vec<String> = self
            .slots
            .iter()
            .take((size / 10).max(1))
            .map(|slot| slot.key().clone())
            .collect();
        for key in &victims {
            self.slots.remove(key);
        }
        tracing::debug!(evicted = victims.len(), size, "local cache tier evicted entries");
    }
}
