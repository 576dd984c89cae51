//! Real-time side of one impulse file

use basedrop::Shared;

use super::ports::{MeshPort, PathPort, Toggle};
use crate::error::LoadStatus;
use crate::sample::{RenderParams, Sample, Thumbnails};
use crate::types::samples_to_millis;

/// Audio-thread view of an impulse file
///
/// The decoded original lives in the reconfigure work data; this side keeps
/// what the audio path and the display need: the published processed buffer,
/// its thumbnails and the load status.
pub struct ImpulseFile {
    pub(crate) path: PathPort,
    pub(crate) listen: Toggle,
    pub(crate) mesh: MeshPort,
    /// Render settings of the last reconfiguration request
    params: RenderParams,
    /// Needs a new processed buffer on the next reconfiguration
    pub(crate) render: bool,
    pub(crate) status: LoadStatus,
    /// Thumbnails changed and have not reached the mesh yet
    pub(crate) sync: bool,
    /// Frame count of the current original
    pub(crate) original_len: usize,
    pub(crate) processed: Option<Shared<Sample>>,
    pub(crate) thumbnails: Thumbnails,
}

impl Default for ImpulseFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ImpulseFile {
    pub fn new() -> Self {
        Self {
            path: PathPort::default(),
            listen: Toggle::default(),
            mesh: MeshPort::new(),
            params: RenderParams::default(),
            render: false,
            status: LoadStatus::Unspecified,
            sync: false,
            original_len: 0,
            processed: None,
            thumbnails: Thumbnails::new(),
        }
    }

    /// Take new render settings; returns true if they differ from the last
    /// ones and flags the file for rendering
    pub fn update(&mut self, params: &RenderParams) -> bool {
        if self.params == *params {
            return false;
        }
        self.params = *params;
        self.render = true;
        true
    }

    #[inline]
    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    /// Channels of the published processed buffer
    pub fn processed_channels(&self) -> usize {
        self.processed.as_ref().map_or(0, |s| s.channels())
    }

    /// Length of the current original in milliseconds
    pub fn length_ms(&self, sample_rate: u32) -> f32 {
        samples_to_millis(sample_rate, self.original_len)
    }

    /// Publish thumbnails to an empty mesh if a resync is due
    pub fn sync_mesh(&mut self) {
        if self.sync && self.mesh.is_empty() {
            self.mesh.write(&self.thumbnails);
            self.sync = false;
        }
    }

    /// Release the processed buffer and any unserved request (teardown)
    pub fn clear(&mut self) {
        self.path.clear();
        self.processed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_flags_render_on_change() {
        let mut file = ImpulseFile::new();
        assert!(!file.update(&RenderParams::default()));
        assert!(!file.render);

        let params = RenderParams {
            head_cut_ms: 12.0,
            ..Default::default()
        };
        assert!(file.update(&params));
        assert!(file.render);
        assert!(!file.update(&params));
        assert_eq!(file.params().head_cut_ms, 12.0);
    }

    #[test]
    fn test_mesh_sync_waits_for_consumer() {
        let mut file = ImpulseFile::new();
        file.sync = true;
        file.sync_mesh();
        assert!(!file.sync);
        assert!(!file.mesh.is_empty());

        // Display has not consumed the previous mesh yet
        file.sync = true;
        file.sync_mesh();
        assert!(file.sync);

        file.mesh.consume();
        file.sync_mesh();
        assert!(!file.sync);
    }

    #[test]
    fn test_length_from_original() {
        let mut file = ImpulseFile::new();
        file.original_len = 48000;
        assert_eq!(file.length_ms(48000), 1000.0);
    }
}
