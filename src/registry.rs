use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::camera::{Camera, SourceId};
use crate::engine::AssemblyError;

/// Result of an insertion attempt.
#[derive(Debug)]
pub enum Insertion {
    Inserted(Arc<Camera>),
    /// The identity was already registered; the builder was not run.
    AlreadyPresent(Arc<Camera>),
    /// The registry has been closed for shutdown; the builder was not run.
    Closed,
}

/// Mutex-guarded map from source identity to camera.
///
/// Every insert and erase happens with the map lock held, and construction
/// of a new camera runs under that same lock, so for any single identity the
/// order of registry operations is the order in which callers acquired it.
/// Once [`close`](Self::close) has run, no camera can be registered again.
#[derive(Default)]
pub struct CameraRegistry {
    slots: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    cameras: HashMap<SourceId, Arc<Camera>>,
    closed: bool,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a camera for `id` unless one is already registered.
    ///
    /// `build` runs with the registry locked. When it fails the map is left
    /// untouched.
    pub fn insert_with<F>(&self, id: &SourceId, build: F) -> Result<Insertion, AssemblyError>
    where
        F: FnOnce() -> Result<Arc<Camera>, AssemblyError>,
    {
        let mut slots = self.lock();
        if slots.closed {
            return Ok(Insertion::Closed);
        }
        if let Some(existing) = slots.cameras.get(id) {
            return Ok(Insertion::AlreadyPresent(existing.clone()));
        }
        let camera = build()?;
        slots.cameras.insert(id.clone(), camera.clone());
        Ok(Insertion::Inserted(camera))
    }

    /// Destroy and unregister the camera for `id`.
    ///
    /// The camera's pipeline is stopped before the entry disappears.
    pub fn remove(&self, id: &SourceId) -> Option<Arc<Camera>> {
        let mut slots = self.lock();
        let camera = slots.cameras.get(id)?.clone();
        camera.destroy();
        slots.cameras.remove(id);
        Some(camera)
    }

    pub fn lookup(&self, id: &SourceId) -> Option<Arc<Camera>> {
        self.lock().cameras.get(id).cloned()
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.lock().cameras.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().cameras.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Registered identities, sorted.
    pub fn ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.lock().cameras.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Refuse further insertions, then destroy and unregister every camera.
    pub fn close(&self) -> Vec<Arc<Camera>> {
        let mut slots = self.lock();
        slots.closed = true;
        let drained: Vec<Arc<Camera>> = slots.cameras.drain().map(|(_, camera)| camera).collect();
        for camera in &drained {
            camera.destroy();
        }
        drained
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
