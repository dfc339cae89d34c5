pub mod blob;
pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use blob::BrightBlobBackend;
pub use scripted::{ScriptedBackend, ScriptedReply};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
