//! The monitoring loop.
//!
//! One cycle reads a frame, runs the detector, gates and delivers at most
//! one alert, annotates the frame and shows it. The loop moves through
//! four states:
//!
//! ```text
//! Initializing --start--> Running --read error--> DegradedReconnecting
//!                            ^                          |
//!                            +------reopened------------+
//! Running / DegradedReconnecting --stop, quit, failure--> Terminated
//! ```
//!
//! Everything runs on the calling thread. The only value shared with
//! another thread is the `StopSignal`, polled once per cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::alert::{AlertGate, Notifier};
use crate::annotate::Annotator;
use crate::config::SentryConfig;
use crate::detect::{Detection, Detector};
use crate::display::{DisplayEvent, DisplaySink};
use crate::ingest::{FrameSource, SourceGuard};

const STATS_LOG_INTERVAL: u64 = 100;

/// Cooperative stop flag, set from the Ctrl-C handler.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Ctrl-C or another holder of the `StopSignal`.
    StopRequested,
    /// The operator pressed the quit key in the display window.
    QuitKey,
    /// The single reconnect attempt after a failed read did not succeed.
    ReconnectFailed,
    /// Unexpected error inside the loop body.
    LoopError(String),
    /// The camera could not be opened when the loop started.
    StartupFailed(String),
}

impl Termination {
    pub fn is_clean(&self) -> bool {
        matches!(self, Termination::StopRequested | Termination::QuitKey)
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Termination::StopRequested | Termination::QuitKey => 0,
            Termination::StartupFailed(_) => 2,
            Termination::ReconnectFailed | Termination::LoopError(_) => 1,
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::StopRequested => write!(f, "stop requested"),
            Termination::QuitKey => write!(f, "quit key pressed"),
            Termination::ReconnectFailed => write!(f, "camera reconnect failed"),
            Termination::LoopError(reason) => write!(f, "loop error: {}", reason),
            Termination::StartupFailed(reason) => write!(f, "startup failed: {}", reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    DegradedReconnecting,
    Terminated(Termination),
}

/// Per-run settings the loop needs from `SentryConfig`.
#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub camera_index: u32,
    pub confidence_threshold: f32,
    pub target_label: String,
    pub reconnect_backoff: Duration,
    /// Draw a `FRAME N` status line on every frame.
    pub status_line: bool,
}

impl LoopSettings {
    pub fn from_config(config: &SentryConfig) -> Self {
        Self {
            camera_index: config.camera.index,
            confidence_threshold: config.detection.confidence_threshold,
            target_label: config.detection.target_label.clone(),
            reconnect_backoff: config.reconnect.backoff,
            status_line: false,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&SentryConfig::default())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub cycles: u64,
    pub detection_failures: u64,
    pub qualifying_frames: u64,
    /// Calls to `AlertGate::admit`. At most one per cycle.
    pub admit_checks: u64,
    pub alerts_admitted: u64,
    pub alerts_suppressed: u64,
    pub notifier_failures: u64,
    pub reconnects: u64,
}

impl std::fmt::Display for MonitorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cycles={} qualifying={} alerts={} suppressed={} detect_failures={} notify_failures={} reconnects={}",
            self.cycles,
            self.qualifying_frames,
            self.alerts_admitted,
            self.alerts_suppressed,
            self.detection_failures,
            self.notifier_failures,
            self.reconnects
        )
    }
}

/// First detection of the target label at or above the threshold, in
/// detector order. Later qualifying detections in the same frame are
/// ignored for alerting.
pub fn first_qualifying<'a>(
    detections: &'a [Detection],
    target_label: &str,
    confidence_threshold: f32,
) -> Option<&'a Detection> {
    detections
        .iter()
        .find(|detection| detection.qualifies(target_label, confidence_threshold))
}

pub struct MonitorLoop {
    source: SourceGuard,
    detector: Box<dyn Detector>,
    gate: AlertGate,
    notifier: Box<dyn Notifier>,
    display: Box<dyn DisplaySink>,
    annotator: Annotator,
    settings: LoopSettings,
    stop: StopSignal,
    state: LoopState,
    stats: MonitorStats,
}

impl MonitorLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        gate: AlertGate,
        notifier: Box<dyn Notifier>,
        display: Box<dyn DisplaySink>,
        settings: LoopSettings,
        stop: StopSignal,
    ) -> Self {
        Self {
            source: SourceGuard::new(source),
            detector,
            gate,
            notifier,
            display,
            annotator: Annotator::new(settings.target_label.clone()),
            settings,
            stop,
            state: LoopState::Initializing,
            stats: MonitorStats::default(),
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Open the camera. Failure here is a startup error for the caller.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LoopState::Initializing {
            return Err(anyhow!("monitor loop already started"));
        }
        let index = self.settings.camera_index;
        self.source.source_mut().open(index)?;
        log::info!(
            "monitoring {} with detector '{}' (target '{}', threshold {:.2}, display {})",
            self.source.source().describe(),
            self.detector.name(),
            self.settings.target_label,
            self.settings.confidence_threshold,
            self.display.describe()
        );
        self.state = LoopState::Running;
        Ok(())
    }

    /// Advance the state machine by one cycle.
    pub fn step(&mut self) -> &LoopState {
        match self.state {
            LoopState::Initializing => {
                if let Err(err) = self.start() {
                    log::error!("{:#}", err);
                    self.state =
                        LoopState::Terminated(Termination::StartupFailed(format!("{:#}", err)));
                }
            }
            LoopState::Running => self.run_cycle(),
            LoopState::DegradedReconnecting => self.reconnect(),
            LoopState::Terminated(_) => {}
        }
        &self.state
    }

    /// Drive `step` until the loop terminates, then release the camera and
    /// the display.
    pub fn run(&mut self) -> Termination {
        let termination = loop {
            if let LoopState::Terminated(termination) = self.step() {
                break termination.clone();
            }
        };
        self.teardown();
        log::info!("monitor stopped ({}): {}", termination, self.stats);
        termination
    }

    fn run_cycle(&mut self) {
        let mut frame = match self.source.source_mut().read() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("{}; attempting reconnect", err);
                self.state = LoopState::DegradedReconnecting;
                return;
            }
        };

        let detections = match self
            .detector
            .detect(&frame, self.settings.confidence_threshold)
        {
            Ok(detections) => detections,
            Err(err) => {
                self.stats.detection_failures += 1;
                log::warn!("detection failed, skipping frame: {:#}", err);
                Vec::new()
            }
        };

        if let Some(detection) = first_qualifying(
            &detections,
            &self.settings.target_label,
            self.settings.confidence_threshold,
        ) {
            self.stats.qualifying_frames += 1;
            self.stats.admit_checks += 1;
            let details = detection.details();
            if self.gate.admit(frame.captured_at) {
                self.stats.alerts_admitted += 1;
                if let Err(err) = self.notifier.notify(&details) {
                    self.stats.notifier_failures += 1;
                    log::error!("alert notification failed: {:#}", err);
                }
            } else {
                self.stats.alerts_suppressed += 1;
                log::debug!(
                    "alert suppressed, {:.1}s of cooldown left: {}",
                    self.gate.remaining(frame.captured_at),
                    details
                );
            }
        }

        self.annotator.annotate(&mut frame, &detections);
        if self.settings.status_line {
            self.annotator
                .status(&mut frame, &format!("frame {}", self.stats.cycles));
        }
        self.stats.cycles += 1;
        if self.stats.cycles % STATS_LOG_INTERVAL == 0 {
            log::debug!("monitor stats: {}", self.stats);
        }

        match self.display.show(&frame) {
            Ok(DisplayEvent::Continue) => {}
            Ok(DisplayEvent::Quit) => {
                log::info!("quit requested from {}", self.display.describe());
                self.state = LoopState::Terminated(Termination::QuitKey);
                return;
            }
            Err(err) => {
                log::error!("display failed: {:#}", err);
                self.state = LoopState::Terminated(Termination::LoopError(format!("{:#}", err)));
                return;
            }
        }

        if self.stop.is_requested() {
            self.state = LoopState::Terminated(Termination::StopRequested);
        }
    }

    fn reconnect(&mut self) {
        if self.stop.is_requested() {
            self.state = LoopState::Terminated(Termination::StopRequested);
            return;
        }
        self.stats.reconnects += 1;
        if !self.settings.reconnect_backoff.is_zero() {
            std::thread::sleep(self.settings.reconnect_backoff);
        }

        let index = self.settings.camera_index;
        let source = self.source.source_mut();
        source.close();
        match source.open(index) {
            Ok(()) => {
                log::info!("reconnected to {}", source.describe());
                self.state = LoopState::Running;
            }
            Err(err) => {
                log::error!("reconnect failed: {}", err);
                self.state = LoopState::Terminated(Termination::ReconnectFailed);
            }
        }
    }

    fn teardown(&mut self) {
        self.display.close();
        self.source.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, ScriptedBackend};
    use crate::display::HeadlessDisplay;
    use crate::ingest::{SyntheticConfig, SyntheticSource};

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection::new(0, label, confidence, BoundingBox::new(1.0, 1.0, 8.0, 8.0).unwrap())
    }

    struct NullNotifier;

    impl Notifier for NullNotifier {
        fn notify(&mut self, _details: &str) -> Result<()> {
            Ok(())
        }
    }

    fn small_source() -> Box<dyn FrameSource> {
        Box::new(SyntheticSource::new(SyntheticConfig {
            width: 32,
            height: 24,
            ..SyntheticConfig::default()
        }))
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            reconnect_backoff: Duration::ZERO,
            ..LoopSettings::default()
        }
    }

    #[test]
    fn first_qualifying_picks_detector_order() {
        let detections = vec![
            detection("dog", 0.95),
            detection("person", 0.4),
            detection("person", 0.8),
            detection("person", 0.9),
        ];
        let found = first_qualifying(&detections, "person", 0.5).unwrap();
        assert_eq!(found.confidence, 0.8);
        assert!(first_qualifying(&detections[..2], "person", 0.5).is_none());
    }

    #[test]
    fn threshold_is_inclusive() {
        let detections = vec![detection("person", 0.5)];
        assert!(first_qualifying(&detections, "person", 0.5).is_some());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Termination::StopRequested.exit_code(), 0);
        assert_eq!(Termination::QuitKey.exit_code(), 0);
        assert_eq!(Termination::ReconnectFailed.exit_code(), 1);
        assert_eq!(Termination::LoopError("boom".into()).exit_code(), 1);
        assert_eq!(Termination::StartupFailed("no camera".into()).exit_code(), 2);
    }

    #[test]
    fn step_from_initializing_starts_the_loop() {
        let mut monitor = MonitorLoop::new(
            small_source(),
            Box::new(ScriptedBackend::default()),
            AlertGate::new(30.0),
            Box::new(NullNotifier),
            Box::new(HeadlessDisplay::new()),
            settings(),
            StopSignal::new(),
        );
        assert_eq!(monitor.state(), &LoopState::Initializing);
        assert_eq!(monitor.step(), &LoopState::Running);
        assert!(monitor.start().is_err());
    }

    #[test]
    fn camera_open_failure_on_first_step_is_a_startup_failure() {
        let source = Box::new(SyntheticSource::new(SyntheticConfig {
            refuse_open: true,
            ..SyntheticConfig::default()
        }));
        let mut monitor = MonitorLoop::new(
            source,
            Box::new(ScriptedBackend::default()),
            AlertGate::new(30.0),
            Box::new(NullNotifier),
            Box::new(HeadlessDisplay::new()),
            settings(),
            StopSignal::new(),
        );

        let termination = monitor.run();
        assert!(matches!(termination, Termination::StartupFailed(_)));
        assert_eq!(termination.exit_code(), 2);
        assert_eq!(monitor.stats().cycles, 0);
    }

    #[test]
    fn stop_signal_ends_after_current_cycle() {
        let stop = StopSignal::new();
        let mut monitor = MonitorLoop::new(
            small_source(),
            Box::new(ScriptedBackend::default()),
            AlertGate::new(30.0),
            Box::new(NullNotifier),
            Box::new(HeadlessDisplay::new()),
            settings(),
            stop.clone(),
        );
        monitor.start().unwrap();
        monitor.step();
        stop.request();
        assert_eq!(
            monitor.step(),
            &LoopState::Terminated(Termination::StopRequested)
        );
        assert_eq!(monitor.run(), Termination::StopRequested);
        assert_eq!(monitor.stats().cycles, 2);
    }
}
