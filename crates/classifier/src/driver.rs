//! Batch accumulation and capture loops
//!
//! The driver collects named frames until exactly one batch is available,
//! runs preprocess, inference and extraction in sequence, and hands the
//! labeled results to the caller.
//!
//! Image mode feeds frames one at a time and treats decode failures as fatal.
//! Video mode reads one frame per source per cycle and stops softly when a
//! source drifts, drains or breaks.

use std::fmt;
use std::path::Path;

use frame_source::{load_image, Frame, VideoSource};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{ClassifyError, ClassifyNet, Profiler, Stage, TrailingBatchPolicy};

/// Accumulation state of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No frames pending
    Idle,
    /// Holding fewer frames than the batch size
    Accumulating(usize),
    /// A full batch is being processed
    BatchReady,
}

/// Classification of one named image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledResult {
    pub name: String,
    pub class_id: usize,
    pub score: f32,
}

impl fmt::Display for LabeledResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} class id : {} score : {:.6}", self.name, self.class_id, self.score)
    }
}

/// Why a video run ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The configured number of cycles completed
    CycleLimit,
    /// A frame did not match its source's declared size
    FrameShapeMismatch {
        source: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// A source ran out of frames
    SourceExhausted { source: usize },
    /// A source failed to decode its next frame
    SourceFailed { source: usize, message: String },
    /// Fewer live frames than the batch size were collected
    InsufficientFrames { available: usize, required: usize },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::CycleLimit => write!(f, "cycle limit reached"),
            StopReason::FrameShapeMismatch {
                source,
                expected,
                actual,
            } => write!(
                f,
                "source {} frame is {}x{}, declared {}x{}",
                source, actual.0, actual.1, expected.0, expected.1
            ),
            StopReason::SourceExhausted { source } => write!(f, "source {} exhausted", source),
            StopReason::SourceFailed { source, message } => {
                write!(f, "source {} failed: {}", source, message)
            }
            StopReason::InsufficientFrames {
                available,
                required,
            } => write!(f, "only {} of {} frames available", available, required),
        }
    }
}

/// Summary of a video run
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOutcome {
    /// Batch cycles completed
    pub cycles: u32,
    pub stop: StopReason,
}

/// What happened to images left pending when input ended
#[derive(Debug, Clone, PartialEq)]
pub enum TrailingBatch {
    /// Nothing was pending
    None,
    /// Pending images were discarded
    Dropped(Vec<String>),
    /// Pending images were classified in a batch padded with copies of the last one
    Padded { classified: usize, padding: usize },
}

/// Drives a [`ClassifyNet`] over image lists and video sources
pub struct PipelineDriver {
    net: ClassifyNet,
    profiler: Profiler,
    trailing: TrailingBatchPolicy,
    state: DriverState,
    pending_frames: Vec<Frame>,
    pending_names: Vec<String>,
}

impl PipelineDriver {
    pub fn new(net: ClassifyNet, trailing: TrailingBatchPolicy) -> Self {
        let batch_size = net.batch_size();
        info!(
            "Creating pipeline driver: batch_size={}, trailing batch policy={}",
            batch_size,
            trailing.as_str()
        );
        Self {
            net,
            profiler: Profiler::new(),
            trailing,
            state: DriverState::Idle,
            pending_frames: Vec::with_capacity(batch_size),
            pending_names: Vec::with_capacity(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.net.batch_size()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn net(&self) -> &ClassifyNet {
        &self.net
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    /// Add one named frame; runs the batch once exactly `batch_size` are pending
    pub fn push(&mut self, name: impl Into<String>, frame: Frame) -> Result<Option<Vec<LabeledResult>>, ClassifyError> {
        self.pending_names.push(name.into());
        self.pending_frames.push(frame);

        if self.pending_frames.len() < self.batch_size() {
            self.state = DriverState::Accumulating(self.pending_frames.len());
            return Ok(None);
        }

        self.run_pending().map(Some)
    }

    /// Decode and classify every image in `paths`, naming each by its file name.
    ///
    /// Returns the number of images classified. A decode failure aborts the run.
    pub fn run_image_list<I, P, F>(&mut self, paths: I, mut emit: F) -> Result<usize, ClassifyError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        F: FnMut(&LabeledResult),
    {
        let mut classified = 0;
        for path in paths {
            let path = path.as_ref();
            let frame = self.profiler.time(Stage::Decode, || load_image(path))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            if let Some(results) = self.push(name, frame)? {
                classified += results.len();
                results.iter().for_each(&mut emit);
            }
        }
        Ok(classified)
    }

    /// Read one frame per source per cycle and classify each full batch.
    ///
    /// `None` entries are sources that failed to open; they contribute no
    /// frames. Source problems end the loop with a [`StopReason`] instead of
    /// an error; inference failures still propagate.
    pub fn run_video<F>(
        &mut self,
        sources: &mut [Option<Box<dyn VideoSource>>],
        max_cycles: u32,
        mut emit: F,
    ) -> Result<VideoOutcome, ClassifyError>
    where
        F: FnMut(&LabeledResult),
    {
        let batch_size = self.batch_size();
        let mut frame_id: u64 = 0;
        let mut cycles = 0;

        let stop = loop {
            if cycles == max_cycles {
                break StopReason::CycleLimit;
            }

            self.profiler.begin(Stage::Decode);
            let mut frames = Vec::with_capacity(batch_size);
            let mut interrupted = None;

            for (index, slot) in sources.iter_mut().enumerate() {
                let Some(source) = slot else {
                    warn!("Video source {} failed to open, skipping", index);
                    continue;
                };
                let declared = source.declared_size();
                match source.read_frame() {
                    Ok(Some(frame)) if frame.size() == declared => {
                        frames.push((format!("{}_{}_video.jpg", frame_id, index), frame));
                        frame_id += 1;
                    }
                    Ok(Some(frame)) => {
                        interrupted = Some(StopReason::FrameShapeMismatch {
                            source: index,
                            expected: declared,
                            actual: frame.size(),
                        });
                        break;
                    }
                    Ok(None) => {
                        interrupted = Some(StopReason::SourceExhausted { source: index });
                        break;
                    }
                    Err(e) => {
                        warn!("Video source {} ({}) read failed: {}", index, source.uri(), e);
                        interrupted = Some(StopReason::SourceFailed {
                            source: index,
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
            self.profiler.end(Stage::Decode);

            if let Some(reason) = interrupted {
                break reason;
            }
            if frames.len() < batch_size {
                break StopReason::InsufficientFrames {
                    available: frames.len(),
                    required: batch_size,
                };
            }

            for (name, frame) in frames {
                if let Some(results) = self.push(name, frame)? {
                    results.iter().for_each(&mut emit);
                }
            }
            cycles += 1;
        };

        info!("Video loop stopped after {} cycles: {}", cycles, stop);
        Ok(VideoOutcome { cycles, stop })
    }

    /// Settle images still pending at end of input according to the policy
    pub fn finish<F>(&mut self, mut emit: F) -> Result<TrailingBatch, ClassifyError>
    where
        F: FnMut(&LabeledResult),
    {
        if self.pending_frames.is_empty() {
            return Ok(TrailingBatch::None);
        }

        match self.trailing {
            TrailingBatchPolicy::Drop => {
                debug!("Dropping {} images of a partial batch", self.pending_names.len());
                Ok(TrailingBatch::Dropped(self.take_pending()))
            }
            TrailingBatchPolicy::Report => {
                let dropped = self.take_pending();
                warn!(
                    "Input ended with a partial batch: {} of {} images not classified",
                    dropped.len(),
                    self.batch_size()
                );
                for name in &dropped {
                    warn!("Not classified: {}", name);
                }
                Ok(TrailingBatch::Dropped(dropped))
            }
            TrailingBatchPolicy::Pad => {
                let classified = self.pending_frames.len();
                let padding = self.batch_size() - classified;
                if let Some(last) = self.pending_frames.last().cloned() {
                    self.pending_frames.extend(std::iter::repeat(last).take(padding));
                    self.pending_names.extend(std::iter::repeat(String::new()).take(padding));
                }
                debug!("Padding partial batch of {} with {} copies", classified, padding);

                let mut results = self.run_pending()?;
                results.truncate(classified);
                results.iter().for_each(&mut emit);
                Ok(TrailingBatch::Padded { classified, padding })
            }
        }
    }

    fn run_pending(&mut self) -> Result<Vec<LabeledResult>, ClassifyError> {
        self.state = DriverState::BatchReady;
        let outcome = self.net.classify(&self.pending_frames, &mut self.profiler);
        let names = self.take_pending();

        let labeled = outcome?
            .into_iter()
            .zip(names)
            .map(|(result, name)| LabeledResult {
                name,
                class_id: result.class_id,
                score: result.score,
            })
            .collect();
        Ok(labeled)
    }

    fn take_pending(&mut self) -> Vec<String> {
        self.pending_frames.clear();
        self.state = DriverState::Idle;
        std::mem::take(&mut self.pending_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NormalizationConfig;
    use accel_runtime::MockBackend;
    use frame_source::SourceError;

    fn driver(backend: &MockBackend, trailing: TrailingBatchPolicy) -> PipelineDriver {
        let net = ClassifyNet::new(backend, Path::new("mock.onnx"), 0, &NormalizationConfig::default()).unwrap();
        PipelineDriver::new(net, trailing)
    }

    /// In-memory source yielding frames of the given sizes
    struct ScriptedSource {
        declared: (u32, u32),
        sizes: Vec<(u32, u32)>,
        next: usize,
    }

    impl ScriptedSource {
        fn boxed(declared: (u32, u32), sizes: Vec<(u32, u32)>) -> Option<Box<dyn VideoSource>> {
            Some(Box::new(Self {
                declared,
                sizes,
                next: 0,
            }))
        }
    }

    impl VideoSource for ScriptedSource {
        fn uri(&self) -> &str {
            "scripted"
        }

        fn declared_size(&self) -> (u32, u32) {
            self.declared
        }

        fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            let Some(&(w, h)) = self.sizes.get(self.next) else {
                return Ok(None);
            };
            self.next += 1;
            Ok(Some(Frame::solid(w, h, [50, 60, 70])))
        }
    }

    #[test]
    fn test_batch_ready_only_at_batch_size() {
        let backend = MockBackend::float32(3, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Report);
        assert_eq!(driver.state(), DriverState::Idle);

        for i in 0..2 {
            let out = driver.push(format!("img{}", i), Frame::solid(4, 4, [0, 0, 0])).unwrap();
            assert!(out.is_none());
            assert_eq!(driver.state(), DriverState::Accumulating(i + 1));
            assert_eq!(backend.executions(), 0);
        }

        let results = driver.push("img2", Frame::solid(4, 4, [0, 0, 0])).unwrap().unwrap();
        assert_eq!(backend.executions(), 1);
        assert_eq!(driver.state(), DriverState::Idle);
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["img0", "img1", "img2"]);
    }

    #[test]
    fn test_report_policy_drops_trailing_images() {
        let backend = MockBackend::float32(2, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Report);
        driver.push("a.jpg", Frame::solid(4, 4, [0, 0, 0])).unwrap();

        let mut emitted = Vec::new();
        let trailing = driver.finish(|r| emitted.push(r.clone())).unwrap();
        assert_eq!(trailing, TrailingBatch::Dropped(vec!["a.jpg".to_string()]));
        assert!(emitted.is_empty());
        assert_eq!(backend.executions(), 0);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_pad_policy_classifies_real_images_only() {
        let backend = MockBackend::float32(4, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Pad);
        driver.push("a.jpg", Frame::solid(4, 4, [0, 0, 0])).unwrap();
        driver.push("b.jpg", Frame::solid(4, 4, [0, 0, 0])).unwrap();

        let mut emitted = Vec::new();
        let trailing = driver.finish(|r| emitted.push(r.name.clone())).unwrap();
        assert_eq!(trailing, TrailingBatch::Padded { classified: 2, padding: 2 });
        assert_eq!(emitted, vec!["a.jpg", "b.jpg"]);
        assert_eq!(backend.executions(), 1);
    }

    #[test]
    fn test_finish_without_pending() {
        let backend = MockBackend::float32(2, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Pad);
        assert_eq!(driver.finish(|_| {}).unwrap(), TrailingBatch::None);
    }

    #[test]
    fn test_video_stops_at_cycle_limit() {
        let backend = MockBackend::float32(2, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Report);
        let mut sources = vec![
            ScriptedSource::boxed((8, 8), vec![(8, 8); 10]),
            ScriptedSource::boxed((6, 6), vec![(6, 6); 10]),
        ];

        let mut names = Vec::new();
        let outcome = driver.run_video(&mut sources, 3, |r| names.push(r.name.clone())).unwrap();
        assert_eq!(outcome, VideoOutcome { cycles: 3, stop: StopReason::CycleLimit });
        assert_eq!(backend.executions(), 3);
        assert_eq!(&names[..4], &["0_0_video.jpg", "1_1_video.jpg", "2_0_video.jpg", "3_1_video.jpg"]);
    }

    #[test]
    fn test_video_stops_on_shape_drift() {
        let backend = MockBackend::float32(2, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Report);
        let mut sources = vec![
            ScriptedSource::boxed((8, 8), vec![(8, 8), (8, 8), (8, 8)]),
            ScriptedSource::boxed((8, 8), vec![(8, 8), (4, 4), (8, 8)]),
        ];

        let outcome = driver.run_video(&mut sources, 200, |_| {}).unwrap();
        assert_eq!(outcome.cycles, 1);
        assert_eq!(
            outcome.stop,
            StopReason::FrameShapeMismatch {
                source: 1,
                expected: (8, 8),
                actual: (4, 4)
            }
        );
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_video_stops_when_source_missing() {
        let backend = MockBackend::float32(2, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Report);
        let mut sources = vec![ScriptedSource::boxed((8, 8), vec![(8, 8); 4]), None];

        let outcome = driver.run_video(&mut sources, 200, |_| {}).unwrap();
        assert_eq!(outcome.cycles, 0);
        assert_eq!(
            outcome.stop,
            StopReason::InsufficientFrames {
                available: 1,
                required: 2
            }
        );
        assert_eq!(backend.executions(), 0);
    }

    #[test]
    fn test_video_stops_when_source_drained() {
        let backend = MockBackend::float32(1, 4, 4, 8);
        let mut driver = driver(&backend, TrailingBatchPolicy::Report);
        let mut sources = vec![ScriptedSource::boxed((8, 8), vec![(8, 8); 2])];

        let outcome = driver.run_video(&mut sources, 200, |_| {}).unwrap();
        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.stop, StopReason::SourceExhausted { source: 0 });
    }

    #[test]
    fn test_inference_failure_propagates() {
        let backend = MockBackend::float32(1, 4, 4, 8).failing_on(2);
        let mut driver = driver(&backend, TrailingBatchPolicy::Report);
        let mut sources = vec![ScriptedSource::boxed((8, 8), vec![(8, 8); 5])];

        let result = driver.run_video(&mut sources, 200, |_| {});
        assert!(matches!(result, Err(ClassifyError::Runtime(_))));
    }

    #[test]
    fn test_labeled_result_display() {
        let result = LabeledResult {
            name: "cat.jpg".to_string(),
            class_id: 281,
            score: 0.5,
        };
        assert_eq!(result.to_string(), "cat.jpg class id : 281 score : 0.500000");
    }
}
