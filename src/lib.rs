//! Person Sentry
//!
//! A single-camera monitor that watches a live video feed, runs an object
//! detector on every frame and raises an audible alert when a person is
//! seen, at most once per cooldown window.
//!
//! # Module Structure
//!
//! - `frame`: captured RGB frames and capture timestamps
//! - `ingest`: camera sources (V4L2 devices, synthetic `stub://` scenes)
//! - `detect`: detector contract, backends, labels and non-max suppression
//! - `alert`: cooldown gate, sound playback and notification
//! - `annotate`: bounding-box and label overlays
//! - `display`: window, snapshot and headless sinks
//! - `monitor`: the read, detect, alert, show loop and its lifecycle
//! - `config`: defaults, config file and environment overrides

pub mod alert;
pub mod annotate;
pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod monitor;

pub use alert::{AlertGate, AlertNotifier, GateState, Notifier};
pub use annotate::Annotator;
pub use config::{BackendKind, DisplayMode, SentryConfig};
pub use detect::{load_detector, BoundingBox, Detection, Detector};
pub use display::{open_display, DisplayEvent, DisplaySink};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceError, SourceGuard};
pub use monitor::{LoopSettings, LoopState, MonitorLoop, MonitorStats, StopSignal, Termination};
