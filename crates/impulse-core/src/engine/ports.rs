//! Control inputs and display outputs of the engine
//!
//! - [`PathPort`]: file path requests with an accept/commit handshake
//! - [`Toggle`]: edge-triggered control (listen)
//! - [`MeshPort`]: thumbnail buffer handed to the display once per resync
//! - [`ReverbAtomics`]: lock-free mirror of status, length and activity

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use basedrop::Owned;

use crate::error::LoadStatus;
use crate::sample::Thumbnails;
use crate::types::{MESH_SIZE, NUM_FILES, NUM_SLOTS, TRACKS_MAX};

// ─────────────────────────────────────────────────────────────
// Path requests
// ─────────────────────────────────────────────────────────────

/// What a file's loader should do next
pub enum PathRequest {
    /// Load this path (`None` unloads the file)
    Load(Option<Owned<PathBuf>>),
    /// Load the path the loader already holds again
    Reload,
}

/// Path request port of one impulse file
///
/// A request is *pending* until taken, *accepted* while the loader works on
/// it and settled by `commit` once the result has been consumed. A request
/// arriving while another is accepted stays pending and is served next.
#[derive(Default)]
pub struct PathPort {
    request: Option<Option<Owned<PathBuf>>>,
    reload: bool,
    accepted: bool,
}

impl PathPort {
    /// Request `path`; returns true if an unserved request was displaced
    pub fn submit(&mut self, path: Option<Owned<PathBuf>>) -> bool {
        self.reload = false;
        self.request.replace(path).is_some_and(|old| old.is_some())
    }

    /// Ask for the current path to be loaded again
    pub fn request_reload(&mut self) {
        if self.request.is_none() {
            self.reload = true;
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.request.is_some() || self.reload
    }

    /// Take the pending request, if any
    pub fn take(&mut self) -> Option<PathRequest> {
        if let Some(path) = self.request.take() {
            self.reload = false;
            return Some(PathRequest::Load(path));
        }
        std::mem::take(&mut self.reload).then_some(PathRequest::Reload)
    }

    /// Mark the taken request as in flight
    pub fn accept(&mut self) {
        self.accepted = true;
    }

    #[inline]
    pub fn accepted(&self) -> bool {
        self.accepted
    }

    /// Settle the in-flight request
    pub fn commit(&mut self) {
        self.accepted = false;
    }

    /// Drop any unserved request (teardown)
    pub fn clear(&mut self) {
        self.request = None;
        self.reload = false;
        self.accepted = false;
    }
}

// ─────────────────────────────────────────────────────────────
// Trigger
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ToggleState {
    #[default]
    Off,
    Pending,
    On,
}

/// Edge-triggered control
///
/// Raising the level makes the toggle pending; it fires once when committed
/// and must be released before it can fire again.
#[derive(Debug, Default)]
pub struct Toggle {
    state: ToggleState,
}

impl Toggle {
    pub fn submit(&mut self, level: bool) {
        self.state = match (self.state, level) {
            (ToggleState::Off, true) => ToggleState::Pending,
            (ToggleState::On, false) => ToggleState::Off,
            (state, _) => state,
        };
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state == ToggleState::Pending
    }

    pub fn commit(&mut self) {
        if self.state == ToggleState::Pending {
            self.state = ToggleState::On;
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Thumbnail mesh
// ─────────────────────────────────────────────────────────────

/// Display copy of a file's thumbnails
///
/// The engine writes only into an empty mesh; the display marks it empty
/// again with [`MeshPort::consume`] once it has drawn it. Storage is
/// allocated once, writes are plain copies.
pub struct MeshPort {
    tracks: Vec<Vec<f32>>,
    channels: usize,
    full: bool,
}

impl Default for MeshPort {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshPort {
    pub fn new() -> Self {
        Self {
            tracks: vec![vec![0.0; MESH_SIZE]; TRACKS_MAX],
            channels: 0,
            full: false,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.full
    }

    /// Copy `thumbnails` in and mark the mesh full
    pub fn write(&mut self, thumbnails: &Thumbnails) {
        self.channels = thumbnails.channels();
        for (i, row) in self.tracks.iter_mut().enumerate().take(self.channels) {
            row.copy_from_slice(thumbnails.track(i));
        }
        self.full = true;
    }

    /// Mark the mesh as drawn
    pub fn consume(&mut self) {
        self.full = false;
    }

    /// Number of meaningful tracks
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn track(&self, index: usize) -> &[f32] {
        &self.tracks[index]
    }
}

// ─────────────────────────────────────────────────────────────
// Lock-free state mirror
// ─────────────────────────────────────────────────────────────

/// Output values of one impulse file
pub struct FileAtomics {
    status: AtomicU8,
    /// IR length in ms, stored as f32 bits
    length_ms: AtomicU32,
}

impl FileAtomics {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(LoadStatus::Unspecified.code()),
            length_ms: AtomicU32::new(0f32.to_bits()),
        }
    }
}

/// Engine state readable from any thread without locking
///
/// The audio thread stores at the end of every block. All operations use
/// `Ordering::Relaxed`; readers only need eventual visibility.
pub struct ReverbAtomics {
    files: [FileAtomics; NUM_FILES],
    slots_active: [AtomicBool; NUM_SLOTS],
}

impl Default for ReverbAtomics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReverbAtomics {
    pub fn new() -> Self {
        Self {
            files: std::array::from_fn(|_| FileAtomics::new()),
            slots_active: std::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    /// Load status of `file`
    #[inline]
    pub fn file_status(&self, file: usize) -> LoadStatus {
        LoadStatus::from_code(self.files[file].status.load(Ordering::Relaxed))
    }

    /// Length of the original of `file` in milliseconds
    #[inline]
    pub fn file_length_ms(&self, file: usize) -> f32 {
        f32::from_bits(self.files[file].length_ms.load(Ordering::Relaxed))
    }

    /// Whether `slot` has a kernel bound
    #[inline]
    pub fn slot_active(&self, slot: usize) -> bool {
        self.slots_active[slot].load(Ordering::Relaxed)
    }

    pub(crate) fn store_file(&self, file: usize, status: LoadStatus, length_ms: f32) {
        let f = &self.files[file];
        f.status.store(status.code(), Ordering::Relaxed);
        f.length_ms.store(length_ms.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn store_slot(&self, slot: usize, active: bool) {
        self.slots_active[slot].store(active, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Collector;

    #[test]
    fn test_path_port_handshake() {
        let collector = Collector::new();
        let handle = collector.handle();
        let mut port = PathPort::default();
        assert!(!port.is_pending());

        assert!(!port.submit(Some(Owned::new(&handle, PathBuf::from("a.wav")))));
        assert!(port.submit(Some(Owned::new(&handle, PathBuf::from("b.wav")))));
        assert!(port.is_pending());

        match port.take() {
            Some(PathRequest::Load(Some(path))) => assert_eq!(*path, PathBuf::from("b.wav")),
            _ => panic!("expected a load request"),
        }
        port.accept();
        assert!(port.accepted());
        assert!(!port.is_pending());

        // A request during loading waits for the next round
        port.submit(None);
        assert!(port.is_pending());
        port.commit();
        assert!(!port.accepted());
        assert!(matches!(port.take(), Some(PathRequest::Load(None))));
    }

    #[test]
    fn test_reload_yields_to_new_path() {
        let collector = Collector::new();
        let mut port = PathPort::default();
        port.request_reload();
        assert!(matches!(port.take(), Some(PathRequest::Reload)));
        assert!(port.take().is_none());

        port.request_reload();
        port.submit(Some(Owned::new(&collector.handle(), PathBuf::from("c.wav"))));
        assert!(matches!(port.take(), Some(PathRequest::Load(Some(_)))));
        assert!(port.take().is_none());
    }

    #[test]
    fn test_toggle_fires_once_per_press() {
        let mut toggle = Toggle::default();
        toggle.submit(true);
        assert!(toggle.is_pending());
        toggle.commit();
        assert!(!toggle.is_pending());

        // Held down: no retrigger
        toggle.submit(true);
        assert!(!toggle.is_pending());

        toggle.submit(false);
        toggle.submit(true);
        assert!(toggle.is_pending());
    }

    #[test]
    fn test_mesh_write_and_consume() {
        let mut mesh = MeshPort::new();
        assert!(mesh.is_empty());

        let thumbnails = Thumbnails::new();
        mesh.write(&thumbnails);
        assert!(!mesh.is_empty());
        assert_eq!(mesh.channels(), 0);
        assert_eq!(mesh.track(0).len(), MESH_SIZE);

        mesh.consume();
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_atomics_roundtrip() {
        let atomics = ReverbAtomics::new();
        assert_eq!(atomics.file_status(0), LoadStatus::Unspecified);
        atomics.store_file(2, LoadStatus::NotFound, 1234.5);
        atomics.store_slot(3, true);
        assert_eq!(atomics.file_status(2), LoadStatus::NotFound);
        assert_eq!(atomics.file_length_ms(2), 1234.5);
        assert!(atomics.slot_active(3));
        assert!(!atomics.slot_active(0));
    }
}
