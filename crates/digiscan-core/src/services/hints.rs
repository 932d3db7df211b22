//! Scan hints
//!
//! Callers that copy, move or modify files announce the operation before
//! the scanner sees it. The scanner then keeps the identity of the source
//! item instead of treating the destination as a new file.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Items copied or moved into one destination album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyMoveHint {
    pub src_ids: Vec<i64>,
    pub dst_album_root_id: i64,
    pub dst_album: String,
    /// Destination file names, parallel to `src_ids`
    pub dst_names: Vec<String>,
}

impl CopyMoveHint {
    /// Source id for a destination file name
    pub fn src_id_for(&self, dst_name: &str) -> Option<i64> {
        self.dst_names
            .iter()
            .position(|n| n == dst_name)
            .and_then(|idx| self.src_ids.get(idx).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemChangeType {
    /// File content changed, re-read hard attributes
    Modified,
    /// Metadata was rewritten, extract everything again
    Rescan,
}

/// Items known to have changed on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChangeHint {
    pub ids: Vec<i64>,
    pub change_type: ItemChangeType,
}

/// A whole album copied or moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumCopyMoveHint {
    pub src_root: i64,
    pub src_album: String,
    pub dst_root: i64,
    pub dst_album: String,
}

#[derive(Debug, Default)]
struct HintLists {
    item_copy_move: Vec<(Instant, CopyMoveHint)>,
    item_change: Vec<(Instant, ItemChangeHint)>,
    album_copy_move: Vec<(Instant, AlbumCopyMoveHint)>,
}

/// Timestamped hint lists with an expiry policy.
#[derive(Debug)]
pub struct HintStore {
    lists: Mutex<HintLists>,
    expiry: Duration,
}

impl Default for HintStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl HintStore {
    pub fn new(expiry: Duration) -> Self {
        Self {
            lists: Mutex::new(HintLists::default()),
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn put_item_hints(&self, hint: CopyMoveHint) {
        self.put_item_hints_at(hint, Instant::now());
    }

    pub fn put_item_hints_at(&self, hint: CopyMoveHint, at: Instant) {
        self.lists.lock().item_copy_move.push((at, hint));
    }

    pub fn put_item_change_hint(&self, hint: ItemChangeHint) {
        self.lists.lock().item_change.push((Instant::now(), hint));
    }

    pub fn put_album_hint(&self, hint: AlbumCopyMoveHint) {
        self.put_album_hint_at(hint, Instant::now());
    }

    pub fn put_album_hint_at(&self, hint: AlbumCopyMoveHint, at: Instant) {
        self.lists.lock().album_copy_move.push((at, hint));
    }

    /// Take the source item id announced for a destination file.
    ///
    /// The matching name is removed from its hint; a hint with no names
    /// left is dropped.
    pub fn take_item_hint_for(&self, album_root_id: i64, album: &str, name: &str) -> Option<i64> {
        let mut lists = self.lists.lock();
        let mut found = None;

        for (_, hint) in lists.item_copy_move.iter_mut() {
            if hint.dst_album_root_id != album_root_id || hint.dst_album != album {
                continue;
            }
            if let Some(idx) = hint.dst_names.iter().position(|n| n == name) {
                hint.dst_names.remove(idx);
                if idx < hint.src_ids.len() {
                    found = Some(hint.src_ids.remove(idx));
                }
                break;
            }
        }

        lists.item_copy_move.retain(|(_, h)| !h.dst_names.is_empty());
        found
    }

    /// Take the change announced for an item, if any
    pub fn take_item_change_hint(&self, id: i64) -> Option<ItemChangeType> {
        let mut lists = self.lists.lock();
        let mut found = None;

        for (_, hint) in lists.item_change.iter_mut() {
            if let Some(idx) = hint.ids.iter().position(|i| *i == id) {
                hint.ids.remove(idx);
                found = Some(hint.change_type);
                break;
            }
        }

        lists.item_change.retain(|(_, h)| !h.ids.is_empty());
        found
    }

    /// Take the album hint whose destination is `(album_root_id, album)`.
    pub fn take_album_hint_for(&self, album_root_id: i64, album: &str) -> Option<AlbumCopyMoveHint> {
        let mut lists = self.lists.lock();
        let idx = lists
            .album_copy_move
            .iter()
            .position(|(_, h)| h.dst_root == album_root_id && h.dst_album == album)?;
        Some(lists.album_copy_move.remove(idx).1)
    }

    /// Drop every hint older than the expiry. Returns how many were dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let expiry = self.expiry;
        let fresh = |at: &Instant| now.saturating_duration_since(*at) < expiry;

        let mut lists = self.lists.lock();
        let before = lists.len();
        lists.item_copy_move.retain(|(at, _)| fresh(at));
        lists.item_change.retain(|(at, _)| fresh(at));
        lists.album_copy_move.retain(|(at, _)| fresh(at));
        let removed = before - lists.len();

        if removed > 0 {
            tracing::debug!("dropped {} expired scan hints", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lists.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HintLists {
    fn len(&self) -> usize {
        self.item_copy_move.len() + self.item_change.len() + self.album_copy_move.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_hint() -> CopyMoveHint {
        CopyMoveHint {
            src_ids: vec![10, 11],
            dst_album_root_id: 1,
            dst_album: "/2021".to_string(),
            dst_names: vec!["a.jpg".to_string(), "b.jpg".to_string()],
        }
    }

    #[test]
    fn test_take_item_hint_consumes_names() {
        let store = HintStore::default();
        store.put_item_hints(copy_hint());

        assert_eq!(store.take_item_hint_for(1, "/2021", "b.jpg"), Some(11));
        assert_eq!(store.take_item_hint_for(1, "/2021", "b.jpg"), None);
        assert_eq!(store.take_item_hint_for(2, "/2021", "a.jpg"), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.take_item_hint_for(1, "/2021", "a.jpg"), Some(10));
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_drops_only_expired() {
        let store = HintStore::new(Duration::from_secs(300));
        let now = Instant::now();
        let old = now.checked_sub(Duration::from_secs(301)).unwrap_or(now);

        store.put_item_hints_at(copy_hint(), old);
        store.put_album_hint_at(
            AlbumCopyMoveHint {
                src_root: 1,
                src_album: "/a".to_string(),
                dst_root: 1,
                dst_album: "/b".to_string(),
            },
            now,
        );

        if old < now {
            assert_eq!(store.sweep(now), 1);
        }
        assert!(store.take_album_hint_for(1, "/b").is_some());
    }

    #[test]
    fn test_item_change_hint() {
        let store = HintStore::default();
        store.put_item_change_hint(ItemChangeHint {
            ids: vec![3],
            change_type: ItemChangeType::Rescan,
        });
        assert_eq!(store.take_item_change_hint(4), None);
        assert_eq!(store.take_item_change_hint(3), Some(ItemChangeType::Rescan));
        assert!(store.is_empty());
    }
}
