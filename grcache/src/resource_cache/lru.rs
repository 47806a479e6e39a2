use crate::resource_cache::CacheRecord;
use slotmap::{SlotMap, new_key_type};

new_key_type! { pub struct RecordId; }

pub(crate) struct Node {
    pub record: Box<dyn CacheRecord>,
    /// Size the cache accounted for this record, refreshed on size change notifications.
    pub bytes: usize,
    prev: Option<RecordId>,
    next: Option<RecordId>,
}

/// Intrusive doubly linked list, most recently used at the head.
#[derive(Default)]
pub(crate) struct LruList {
    nodes: SlotMap<RecordId, Node>,
    head: Option<RecordId>,
    tail: Option<RecordId>,
}

impl LruList {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: RecordId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn tail(&self) -> Option<RecordId> {
        self.tail
    }

    /// The next more recently used record.
    pub fn newer(&self, id: RecordId) -> Option<RecordId> {
        self.nodes.get(id).and_then(|n| n.prev)
    }

    pub fn push_front(&mut self, record: Box<dyn CacheRecord>, bytes: usize) -> RecordId {
        let id = self.nodes.insert(Node {
            record,
            bytes,
            prev: None,
            next: None,
        });
        self.link_front(id);
        id
    }

    pub fn remove(&mut self, id: RecordId) -> Option<Node> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        self.unlink(id);
        self.nodes.remove(id)
    }

    pub fn touch(&mut self, id: RecordId) {
        if self.head == Some(id) || !self.nodes.contains_key(id) {
            return;
        }
        self.unlink(id);
        self.link_front(id);
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.nodes.keys()
    }

    pub fn clear(&mut self) -> Vec<Node> {
        self.head = None;
        self.tail = None;
        self.nodes.drain().map(|(_, node)| node).collect()
    }

    fn link_front(&mut self, id: RecordId) {
        let old_head = self.head;
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.nodes.get_mut(h)) {
            Some(head) => head.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn unlink(&mut self, id: RecordId) {
        let Some((prev, next)) = self.nodes.get(id).map(|n| (n.prev, n.next)) else {
            return;
        };

        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.nodes.get_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = None;
            node.next = None;
        }
    }
}
