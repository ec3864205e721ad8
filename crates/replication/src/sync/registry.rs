use std::collections::HashMap;

use super::buffer::InterpolationBuffer;

#[derive(Debug)]
pub struct RemoteEntity {
    pub id: u32,
    pub buffer: InterpolationBuffer,
}

/// Owns the playback record of every known remote entity: created on a
/// join-world notification, destroyed on leave. The presentation layer only
/// ever sees callbacks; it never touches a buffer.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<u32, RemoteEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record for `id`. Returns false if the entity is already
    /// known, in which case the existing record is kept untouched.
    pub fn insert(&mut self, id: u32) -> bool {
        if self.entities.contains_key(&id) {
            return false;
        }
        self.entities.insert(
            id,
            RemoteEntity {
                id,
                buffer: InterpolationBuffer::new(),
            },
        );
        true
    }

    pub fn remove(&mut self, id: u32) -> bool {
        self.entities.remove(&id).is_some()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: u32) -> Option<&RemoteEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut RemoteEntity> {
        self.entities.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RemoteEntity> {
        self.entities.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.entities.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Freshest buffered capture time across all entities.
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.entities
            .values()
            .filter_map(|e| e.buffer.latest_timestamp())
            .fold(None, |acc, t| Some(acc.map_or(t, |m: f64| m.max(t))))
    }
}
