//! Alerting: the cooldown gate and the user-facing notification.

mod gate;
mod notifier;
mod sound;

pub use gate::{AlertGate, GateState};
pub use notifier::{AlertNotifier, Notifier};
pub use sound::{build_player, CommandPlayer, SoundPlayer, TerminalBell};
