use std::collections::HashMap;
use std::hash::Hash;

use generational_arena::{Arena, Index};

struct Link<K> {
  key: K,
  newer: Option<Index>,
  older: Option<Index>,
}

/// An ordered set of keys, newest first, backing both built-in policies.
///
/// All operations are O(1). Slots live in a generational arena so a stale
/// index can never alias a recycled one.
pub(super) struct KeyQueue<K> {
  slots: Arena<Link<K>>,
  index_of: HashMap<K, Index>,
  newest: Option<Index>,
  oldest: Option<Index>,
}

impl<K: Eq + Hash + Clone> KeyQueue<K> {
  pub(super) fn new() -> Self {
    Self {
      slots: Arena::new(),
      index_of: HashMap::new(),
      newest: None,
      oldest: None,
    }
  }

  pub(super) fn contains(&self, key: &K) -> bool {
    self.index_of.contains_key(key)
  }

  /// Adds `key` as the newest entry. Returns `false` if it was already queued,
  /// leaving its position untouched.
  pub(super) fn enqueue(&mut self, key: &K) -> bool {
    if self.index_of.contains_key(key) {
      return false;
    }
    let slot = self.slots.insert(Link {
      key: key.clone(),
      newer: None,
      older: None,
    });
    self.index_of.insert(key.clone(), slot);
    self.attach_newest(slot);
    true
  }

  /// Makes `key` the newest entry, queueing it if needed.
  pub(super) fn touch(&mut self, key: &K) {
    match self.index_of.get(key).copied() {
      Some(slot) if self.newest == Some(slot) => {}
      Some(slot) => {
        self.detach(slot);
        self.attach_newest(slot);
      }
      None => {
        self.enqueue(key);
      }
    }
  }

  /// Like `touch`, but ignores keys that are not queued.
  pub(super) fn refresh(&mut self, key: &K) {
    if self.contains(key) {
      self.touch(key);
    }
  }

  pub(super) fn forget(&mut self, key: &K) -> bool {
    let Some(slot) = self.index_of.remove(key) else {
      return false;
    };
    self.detach(slot);
    self.slots.remove(slot);
    true
  }

  /// Removes and returns up to `count` of the oldest keys, oldest first.
  pub(super) fn drain_oldest(&mut self, count: usize) -> Vec<K> {
    let mut drained = Vec::with_capacity(count.min(self.index_of.len()));
    while drained.len() < count {
      let Some(slot) = self.oldest else { break };
      self.detach(slot);
      if let Some(link) = self.slots.remove(slot) {
        self.index_of.remove(&link.key);
        drained.push(link.key);
      }
    }
    drained
  }

  pub(super) fn clear(&mut self) {
    self.slots.clear();
    self.index_of.clear();
    self.newest = None;
    self.oldest = None;
  }

  fn attach_newest(&mut self, slot: Index) {
    let previous = self.newest.replace(slot);
    self.slots[slot].newer = None;
    self.slots[slot].older = previous;
    match previous {
      Some(previous) => self.slots[previous].newer = Some(slot),
      None => self.oldest = Some(slot),
    }
  }

  fn detach(&mut self, slot: Index) {
    let (newer, older) = {
      let link = &self.slots[slot];
      (link.newer, link.older)
    };
    match newer {
      Some(newer_slot) => self.slots[newer_slot].older = older,
      None => self.newest = older,
    }
    match older {
      Some(older_slot) => self.slots[older_slot].newer = newer,
      None => self.oldest = newer,
    }
  }

  #[cfg(test)]
  pub(super) fn newest_to_oldest(&self) -> Vec<K> {
    let mut keys = Vec::with_capacity(self.index_of.len());
    let mut cursor = self.newest;
    while let Some(slot) = cursor {
      keys.push(self.slots[slot].key.clone());
      cursor = self.slots[slot].older;
    }
    keys
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn queue_of(keys: &[i32]) -> KeyQueue<i32> {
    let mut queue = KeyQueue::new();
    for key in keys {
      queue.enqueue(key);
    }
    queue
  }

  #[test]
  fn enqueue_keeps_first_position() {
    let mut queue = queue_of(&[1, 2, 3]);
    assert!(!queue.enqueue(&1));
    assert_eq!(queue.newest_to_oldest(), vec![3, 2, 1]);
  }

  #[test]
  fn touch_moves_to_newest_or_adds() {
    let mut queue = queue_of(&[1, 2, 3]);
    queue.touch(&1);
    assert_eq!(queue.newest_to_oldest(), vec![1, 3, 2]);
    queue.touch(&1);
    assert_eq!(queue.newest_to_oldest(), vec![1, 3, 2]);
    queue.touch(&4);
    assert_eq!(queue.newest_to_oldest(), vec![4, 1, 3, 2]);
  }

  #[test]
  fn refresh_ignores_unknown_keys() {
    let mut queue = queue_of(&[1]);
    queue.refresh(&9);
    assert!(!queue.contains(&9));
  }

  #[test]
  fn forget_middle_keeps_links_intact() {
    let mut queue = queue_of(&[1, 2, 3]);
    assert!(queue.forget(&2));
    assert!(!queue.forget(&2));
    assert_eq!(queue.newest_to_oldest(), vec![3, 1]);
    assert_eq!(queue.drain_oldest(5), vec![1, 3]);
    assert!(queue.newest.is_none() && queue.oldest.is_none());
  }

  #[test]
  fn drain_oldest_stops_at_count() {
    let mut queue = queue_of(&[1, 2, 3, 4]);
    assert_eq!(queue.drain_oldest(2), vec![1, 2]);
    assert_eq!(queue.newest_to_oldest(), vec![4, 3]);
    assert!(!queue.contains(&1));
  }

  #[test]
  fn clear_empties_everything() {
    let mut queue = queue_of(&[1, 2]);
    queue.clear();
    assert!(queue.newest_to_oldest().is_empty());
    assert!(queue.drain_oldest(1).is_empty());
    assert!(queue.enqueue(&1), "Queue is usable after clear");
  }
}
