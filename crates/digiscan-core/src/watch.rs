//! Database attribute change notifications.
//!
//! Mutating database operations publish an [`AttributeChange`] here so open
//! views can refresh without polling. Subscribers receive events over a
//! `crossbeam_channel`; subscribers whose receiver was dropped are pruned on
//! the next publish.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Which part of an image's data changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageChangeField {
    ImageTags,
    ImageComment,
    ImageCopyright,
    ImageDate,
    ImageRating,
    ImageInformation,
    ImageMetadata,
    ImagePosition,
    ImageProperties,
    AllFields,
}

/// Kind of structural change to an album, tag or album root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Added,
    Deleted,
    Renamed,
    PropertiesChanged,
}

/// Kind of change to the set of items in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionChangeKind {
    ItemsAdded,
    ItemsRemoved,
    ItemsRemovedAll,
    ItemsMoved,
}

/// Event published by the database layer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AttributeChange {
    ImageChanged { ids: Vec<i64>, field: ImageChangeField },
    CollectionImageChanged { ids: Vec<i64>, kind: CollectionChangeKind },
    AlbumChanged { id: i64, kind: ChangeKind },
    TagChanged { id: i64, kind: ChangeKind },
    AlbumRootChanged { id: i64, kind: ChangeKind },
}

/// Publish/subscribe hub for [`AttributeChange`] events.
#[derive(Debug, Default)]
pub struct AttributesWatch {
    subscribers: Mutex<Vec<Sender<AttributeChange>>>,
}

/// Shared reference to the watch hub.
pub type SharedAttributesWatch = Arc<AttributesWatch>;

impl AttributesWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Receiver<AttributeChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber.
    pub fn publish(&self, change: AttributeChange) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn image_changed(&self, ids: Vec<i64>, field: ImageChangeField) {
        if ids.is_empty() {
            return;
        }
        self.publish(AttributeChange::ImageChanged { ids, field });
    }

    pub fn collection_changed(&self, ids: Vec<i64>, kind: CollectionChangeKind) {
        self.publish(AttributeChange::CollectionImageChanged { ids, kind });
    }

    pub fn album_changed(&self, id: i64, kind: ChangeKind) {
        self.publish(AttributeChange::AlbumChanged { id, kind });
    }

    pub fn tag_changed(&self, id: i64, kind: ChangeKind) {
        self.publish(AttributeChange::TagChanged { id, kind });
    }

    pub fn album_root_changed(&self, id: i64, kind: ChangeKind) {
        self.publish(AttributeChange::AlbumRootChanged { id, kind });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let watch = AttributesWatch::new();
        let rx1 = watch.subscribe();
        let rx2 = watch.subscribe();

        watch.image_changed(vec![1, 2], ImageChangeField::ImageRating);

        let expected = AttributeChange::ImageChanged {
            ids: vec![1, 2],
            field: ImageChangeField::ImageRating,
        };
        assert_eq!(rx1.try_recv().unwrap(), expected);
        assert_eq!(rx2.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let watch = AttributesWatch::new();
        let rx = watch.subscribe();
        drop(watch.subscribe());

        watch.tag_changed(7, ChangeKind::Added);

        assert_eq!(watch.subscriber_count(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_empty_image_change_not_published() {
        let watch = AttributesWatch::new();
        let rx = watch.subscribe();
        watch.image_changed(vec![], ImageChangeField::ImageTags);
        assert!(rx.try_recv().is_err());
    }
}
