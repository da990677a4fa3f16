// lox-vm - Bytecode compiler and virtual machine for the Lox scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Open-addressed hash table keyed by interned strings.
//!
//! Used for globals, the string intern set, class method tables and instance
//! fields. Linear probing; deletions leave tombstones so probe sequences for
//! other keys stay intact. Tombstones count toward the load factor.

use std::mem::size_of;

use crate::object::ObjRef;
use crate::value::Value;

const TABLE_MAX_LOAD: f64 = 0.75;
const MIN_CAPACITY: usize = 8;

/// An interned string handle together with its cached hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrKey {
    pub obj: ObjRef,
    pub hash: u32,
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Empty,
    Tombstone,
    Occupied { key: StrKey, value: Value },
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<Entry>,
    /// Occupied entries plus tombstones.
    count: usize,
    /// Occupied entries only.
    live: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn heap_size(&self) -> usize {
        self.capacity() * size_of::<Entry>()
    }

    /// Look up a key by identity.
    pub fn get(&self, key: StrKey) -> Option<Value> {
        if self.live == 0 {
            return None;
        }
        match self.entries[find_slot(&self.entries, key)] {
            Entry::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Insert or overwrite. Returns true if the key was not present before.
    pub fn set(&mut self, key: StrKey, value: Value) -> bool {
        if (self.count + 1) as f64 > self.entries.len() as f64 * TABLE_MAX_LOAD {
            let capacity = (self.entries.len() * 2).max(MIN_CAPACITY);
            self.resize(capacity);
        }

        let slot = find_slot(&self.entries, key);
        let is_new = match self.entries[slot] {
            Entry::Empty => {
                self.count += 1;
                self.live += 1;
                true
            }
            // Reusing a tombstone: it was already counted.
            Entry::Tombstone => {
                self.live += 1;
                true
            }
            Entry::Occupied { .. } => false,
        };
        self.entries[slot] = Entry::Occupied { key, value };
        is_new
    }

    /// Remove a key, leaving a tombstone. Returns true if it was present.
    pub fn delete(&mut self, key: StrKey) -> bool {
        if self.live == 0 {
            return false;
        }
        let slot = find_slot(&self.entries, key);
        if let Entry::Occupied { .. } = self.entries[slot] {
            self.entries[slot] = Entry::Tombstone;
            self.live -= 1;
            true
        } else {
            false
        }
    }

    /// Copy every live entry of `self` into `to`.
    pub fn add_all_to(&self, to: &mut Table) {
        for (key, value) in self.iter() {
            to.set(key, value);
        }
    }

    /// Find a key by content rather than identity.
    ///
    /// Used by interning before a string object exists: `matches` is only
    /// called for entries whose hash equals `hash`, and decides on length and
    /// bytes.
    pub fn find_by(&self, hash: u32, mut matches: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.live == 0 {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = hash as usize & (capacity - 1);
        loop {
            match self.entries[index] {
                Entry::Empty => return None,
                Entry::Tombstone => {}
                Entry::Occupied { key, .. } => {
                    if key.hash == hash && matches(key.obj) {
                        return Some(key.obj);
                    }
                }
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    /// Delete every entry whose key fails `keep`. Used to make the intern set
    /// weak before the collector sweeps.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(ObjRef) -> bool) {
        for entry in &mut self.entries {
            if let Entry::Occupied { key, .. } = *entry
                && !keep(key.obj)
            {
                *entry = Entry::Tombstone;
                self.live -= 1;
            }
        }
    }

    /// Iterate over live entries.
    pub fn iter(&self) -> impl Iterator<Item = (StrKey, Value)> + '_ {
        self.entries.iter().filter_map(|entry| match *entry {
            Entry::Occupied { key, value } => Some((key, value)),
            _ => None,
        })
    }

    fn resize(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::Empty; capacity]);
        // Tombstones are dropped on rehash.
        self.count = 0;
        for entry in old {
            if let Entry::Occupied { key, value } = entry {
                let slot = find_slot(&self.entries, key);
                self.entries[slot] = Entry::Occupied { key, value };
                self.count += 1;
            }
        }
        self.live = self.count;
    }
}

/// Find the slot holding `key`, or the slot where it should be inserted
/// (the first tombstone passed, else the empty slot that ended the probe).
fn find_slot(entries: &[Entry], key: StrKey) -> usize {
    let capacity = entries.len();
    let mut index = key.hash as usize & (capacity - 1);
    let mut tombstone = None;
    loop {
        match entries[index] {
            Entry::Empty => return tombstone.unwrap_or(index),
            Entry::Tombstone => {
                if tombstone.is_none() {
                    tombstone = Some(index);
                }
            }
            Entry::Occupied { key: k, .. } => {
                if k.obj == key.obj {
                    return index;
                }
            }
        }
        index = (index + 1) & (capacity - 1);
    }
}
