//! Common test utilities shared by the integration tests
//!
//! Scripted decoder backend, byte stream opener and a recording recognition
//! engine, so the processing loop can be driven without GStreamer, network
//! access or a vendor engine.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use stream_scan::capture::{ByteStreamOpener, DecoderBackend, FrameGrabber};
use stream_scan::core::{DecoderPixelFormat, FrameDescriptor, RawFrame, StreamInfo};
use stream_scan::processing::{
    EngineProvider, EngineSettings, RecognitionEngine, RecognizedCode,
};
use stream_scan::session::StopSignal;

pub fn rgb_info(width: u32, height: u32) -> StreamInfo {
    StreamInfo {
        width,
        height,
        pixel_format: DecoderPixelFormat::Rgb24,
    }
}

pub fn rgb_frame(width: u32, height: u32) -> Vec<u8> {
    vec![0x80; width as usize * height as usize * 3]
}

/// Payload the recording engine reports as a recognized code.
pub fn code_frame(code: &str) -> Vec<u8> {
    let mut payload = vec![b'Q'];
    payload.extend_from_slice(code.as_bytes());
    payload
}

/// Polls `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Scripted decoder behaviour
pub mod mock_decoder {
    use super::*;

    #[derive(Debug, Clone)]
    pub enum Step {
        Frame(Vec<u8>),
        /// Zero-length payload
        Empty,
        /// Decoder error while streaming
        Fail(String),
    }

    /// What one opened source does, from open to end-of-stream.
    #[derive(Debug, Clone)]
    pub struct Script {
        pub info: StreamInfo,
        pub open_error: Option<String>,
        pub start_error: Option<String>,
        pub close_error: Option<String>,
        pub steps: Vec<Step>,
        /// Frame repeated forever once `steps` are used up
        pub endless: Option<Vec<u8>>,
    }

    impl Script {
        pub fn new(info: StreamInfo) -> Self {
            Self {
                info,
                open_error: None,
                start_error: None,
                close_error: None,
                steps: Vec::new(),
                endless: None,
            }
        }

        /// `count` identical RGB frames, then end-of-stream.
        pub fn rgb_frames(width: u32, height: u32, count: usize) -> Self {
            let frame = rgb_frame(width, height);
            let mut script = Self::new(rgb_info(width, height));
            for _ in 0..count {
                script = script.frame(frame.clone());
            }
            script
        }

        pub fn open_failure(reason: &str) -> Self {
            Self {
                open_error: Some(reason.to_string()),
                ..Self::new(rgb_info(2, 2))
            }
        }

        pub fn frame(mut self, payload: Vec<u8>) -> Self {
            self.steps.push(Step::Frame(payload));
            self
        }

        pub fn empty(mut self) -> Self {
            self.steps.push(Step::Empty);
            self
        }

        pub fn fail(mut self, reason: &str) -> Self {
            self.steps.push(Step::Fail(reason.to_string()));
            self
        }

        pub fn endless(mut self, payload: Vec<u8>) -> Self {
            self.endless = Some(payload);
            self
        }

        pub fn start_error(mut self, reason: &str) -> Self {
            self.start_error = Some(reason.to_string());
            self
        }

        pub fn close_error(mut self, reason: &str) -> Self {
            self.close_error = Some(reason.to_string());
            self
        }
    }

    /// Every call made on the backend and its grabbers, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        OpenUrl(String),
        OpenStream { locator: String, bytes: usize },
        OpenFile(PathBuf),
        SetOption(String, String),
        Start,
        Close,
    }

    type CallLog = Arc<Mutex<Vec<Call>>>;

    pub struct MockBackend {
        scripts: Mutex<VecDeque<Script>>,
        calls: CallLog,
        stop_when_exhausted: Option<StopSignal>,
    }

    impl MockBackend {
        pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into_iter().collect()),
                calls: Arc::new(Mutex::new(Vec::new())),
                stop_when_exhausted: None,
            }
        }

        /// Requests a stop on `signal` once every script has been used, so a
        /// processor run on the test thread terminates.
        pub fn stop_when_exhausted(mut self, signal: StopSignal) -> Self {
            self.stop_when_exhausted = Some(signal);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
        }

        pub fn opens(&self) -> usize {
            self.count(|c| {
                matches!(
                    c,
                    Call::OpenUrl(_) | Call::OpenStream { .. } | Call::OpenFile(_)
                )
            })
        }

        pub fn closes(&self) -> usize {
            self.count(|c| *c == Call::Close)
        }

        fn open(&self, call: Call) -> Result<Box<dyn FrameGrabber>> {
            self.calls.lock().unwrap().push(call);
            let next = self.scripts.lock().unwrap().pop_front();
            let Some(script) = next else {
                if let Some(signal) = &self.stop_when_exhausted {
                    signal.request();
                }
                bail!("no stream scripted");
            };
            if let Some(reason) = &script.open_error {
                bail!("{reason}");
            }
            Ok(Box::new(MockGrabber {
                script,
                position: 0,
                current: Vec::new(),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    impl DecoderBackend for MockBackend {
        fn open_url(&self, url: &str) -> Result<Box<dyn FrameGrabber>> {
            self.open(Call::OpenUrl(url.to_string()))
        }

        fn open_stream(
            &self,
            locator: &str,
            mut stream: Box<dyn Read + Send>,
        ) -> Result<Box<dyn FrameGrabber>> {
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes)?;
            self.open(Call::OpenStream {
                locator: locator.to_string(),
                bytes: bytes.len(),
            })
        }

        fn open_file(&self, path: &Path) -> Result<Box<dyn FrameGrabber>> {
            self.open(Call::OpenFile(path.to_path_buf()))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    pub struct MockGrabber {
        script: Script,
        position: usize,
        current: Vec<u8>,
        calls: CallLog,
    }

    impl MockGrabber {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl FrameGrabber for MockGrabber {
        fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
            self.record(Call::SetOption(key.to_string(), value.to_string()));
            Ok(())
        }

        fn start(&mut self) -> Result<StreamInfo> {
            self.record(Call::Start);
            match &self.script.start_error {
                Some(reason) => Err(anyhow!("{reason}")),
                None => Ok(self.script.info.clone()),
            }
        }

        fn grab_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
            let step = self.script.steps.get(self.position).cloned();
            self.position += 1;
            let payload = match step {
                Some(Step::Frame(payload)) => payload,
                Some(Step::Empty) => Vec::new(),
                Some(Step::Fail(reason)) => bail!("{reason}"),
                None => match &self.script.endless {
                    Some(payload) => {
                        thread::sleep(Duration::from_millis(1));
                        payload.clone()
                    }
                    None => return Ok(None),
                },
            };
            self.current = payload;
            Ok(Some(RawFrame {
                width: self.script.info.width,
                height: self.script.info.height,
                pixel_format: &self.script.info.pixel_format,
                data: &self.current,
            }))
        }

        fn close(&mut self) -> Result<()> {
            self.record(Call::Close);
            match &self.script.close_error {
                Some(reason) => Err(anyhow!("{reason}")),
                None => Ok(()),
            }
        }
    }

    /// Byte stream opener serving a fixed body for any locator.
    #[derive(Default)]
    pub struct MockStreams {
        pub body: Vec<u8>,
        pub opened: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl MockStreams {
        pub fn with_body(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                ..Self::default()
            }
        }

        pub fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl ByteStreamOpener for MockStreams {
        fn open(&self, locator: &str) -> Result<Box<dyn Read + Send>> {
            self.opened.lock().unwrap().push(locator.to_string());
            if self.fail {
                bail!("connection reset");
            }
            Ok(Box::new(Cursor::new(self.body.clone())))
        }
    }
}

/// Recording recognition engine
pub mod mock_engine {
    use super::*;

    #[derive(Debug, Default)]
    pub struct EngineRecord {
        pub created: Vec<EngineSettings>,
        pub sequences: u64,
        pub frames: Vec<FrameDescriptor>,
        pub clears: u64,
    }

    /// Reports a code for payloads starting with `Q` (the rest of the payload)
    /// and can be told to fail on a given frame.
    #[derive(Clone, Default)]
    pub struct RecordingEngineProvider {
        pub record: Arc<Mutex<EngineRecord>>,
        pub fail_on_frame: Option<usize>,
    }

    impl RecordingEngineProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on_frame(frame: usize) -> Self {
            Self {
                fail_on_frame: Some(frame),
                ..Self::default()
            }
        }

        pub fn frames(&self) -> Vec<FrameDescriptor> {
            self.record.lock().unwrap().frames.clone()
        }

        pub fn clears(&self) -> u64 {
            self.record.lock().unwrap().clears
        }

        pub fn sequences(&self) -> u64 {
            self.record.lock().unwrap().sequences
        }

        pub fn created(&self) -> Vec<EngineSettings> {
            self.record.lock().unwrap().created.clone()
        }
    }

    impl EngineProvider for RecordingEngineProvider {
        fn create(&self, settings: &EngineSettings) -> Result<Box<dyn RecognitionEngine>> {
            self.record.lock().unwrap().created.push(settings.clone());
            Ok(Box::new(RecordingEngine {
                record: Arc::clone(&self.record),
                fail_on_frame: self.fail_on_frame,
                processed: 0,
            }))
        }
    }

    struct RecordingEngine {
        record: Arc<Mutex<EngineRecord>>,
        fail_on_frame: Option<usize>,
        processed: usize,
    }

    impl RecognitionEngine for RecordingEngine {
        fn begin_sequence(&mut self) -> Result<()> {
            self.record.lock().unwrap().sequences += 1;
            Ok(())
        }

        fn process_frame(
            &mut self,
            descriptor: &FrameDescriptor,
            payload: &[u8],
        ) -> Result<Vec<RecognizedCode>> {
            self.processed += 1;
            if self.fail_on_frame == Some(self.processed) {
                bail!("engine rejected frame {}", self.processed);
            }
            self.record.lock().unwrap().frames.push(*descriptor);
            match payload.split_first() {
                Some((b'Q', code)) => Ok(vec![RecognizedCode::new(
                    String::from_utf8_lossy(code).into_owned(),
                )]),
                _ => Ok(Vec::new()),
            }
        }

        fn clear(&mut self) -> Result<()> {
            self.record.lock().unwrap().clears += 1;
            Ok(())
        }
    }
}
