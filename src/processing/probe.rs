//! Stand-in engine used when no vendor engine is linked.
//!
//! It accepts every frame and never reports a code, which is enough to exercise
//! the decode path, reconnection and lifecycle from the command line.

use anyhow::Result;
use tracing::{debug, info};

use super::recognition::{EngineProvider, EngineSettings, RecognitionEngine, RecognizedCode};
use crate::core::FrameDescriptor;

#[derive(Debug, Default)]
pub struct ProbeEngine {
    frames: u64,
    bytes: u64,
}

impl ProbeEngine {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RecognitionEngine for ProbeEngine {
    fn begin_sequence(&mut self) -> Result<()> {
        debug!(frames = self.frames, "Probe engine: new frame sequence");
        Ok(())
    }

    fn process_frame(
        &mut self,
        descriptor: &FrameDescriptor,
        payload: &[u8],
    ) -> Result<Vec<RecognizedCode>> {
        if self.frames == 0 {
            info!(
                width = descriptor.width,
                height = descriptor.height,
                layout = ?descriptor.layout,
                bytes = payload.len(),
                "Probe engine received first frame"
            );
        }
        self.frames += 1;
        self.bytes += payload.len() as u64;
        Ok(Vec::new())
    }

    fn clear(&mut self) -> Result<()> {
        debug!(frames = self.frames, bytes = self.bytes, "Probe engine cleared");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeEngineProvider;

impl EngineProvider for ProbeEngineProvider {
    fn create(&self, settings: &EngineSettings) -> Result<Box<dyn RecognitionEngine>> {
        info!(
            symbologies = ?settings.symbologies,
            duplicate_filter = ?settings.duplicate_filter,
            licensed = !settings.credential.is_empty(),
            "Using probe recognition engine"
        );
        Ok(Box::new(ProbeEngine::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ImageLayout;
    use crate::processing::recognition::Symbology;
    use std::time::Duration;

    #[test]
    fn test_probe_reports_nothing() {
        let provider = ProbeEngineProvider;
        let settings = EngineSettings {
            credential: String::new(),
            symbologies: vec![Symbology::Qr],
            duplicate_filter: Duration::from_millis(5000),
        };
        let mut engine = provider.create(&settings).unwrap();
        let descriptor = FrameDescriptor {
            width: 1,
            height: 1,
            layout: ImageLayout::Unknown,
            memory_size: 1,
        };
        assert!(engine.process_frame(&descriptor, &[0]).unwrap().is_empty());
        assert!(engine.clear().is_ok());
    }
}
