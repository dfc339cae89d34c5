use anyhow::Result;

use super::sound::SoundPlayer;

/// Performs the user-facing side effect of an admitted alert.
pub trait Notifier {
    fn notify(&mut self, details: &str) -> Result<()>;
}

/// Logs the detection, then plays the alert sound to completion.
///
/// Playback blocks the monitor loop for the length of the clip so that an
/// alert is never cut short by a later trigger. Playback failures are
/// logged here and never reach the caller.
pub struct AlertNotifier {
    player: Box<dyn SoundPlayer>,
    delivered: u64,
    playback_failures: u64,
}

impl AlertNotifier {
    pub fn new(player: Box<dyn SoundPlayer>) -> Self {
        Self {
            player,
            delivered: 0,
            playback_failures: 0,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn playback_failures(&self) -> u64 {
        self.playback_failures
    }
}

impl Notifier for AlertNotifier {
    fn notify(&mut self, details: &str) -> Result<()> {
        log::warn!("PERSON DETECTED: {}", details);
        match self.player.play() {
            Ok(()) => log::info!("notifications triggered"),
            Err(err) => {
                self.playback_failures += 1;
                log::error!(
                    "alert playback via {} failed: {:#}",
                    self.player.describe(),
                    err
                );
            }
        }
        self.delivered += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct BrokenSpeaker;

    impl SoundPlayer for BrokenSpeaker {
        fn play(&mut self) -> Result<()> {
            Err(anyhow!("audio device unavailable"))
        }

        fn describe(&self) -> String {
            "broken speaker".to_string()
        }
    }

    struct CountingSpeaker(u32);

    impl SoundPlayer for CountingSpeaker {
        fn play(&mut self) -> Result<()> {
            self.0 += 1;
            Ok(())
        }

        fn describe(&self) -> String {
            "counting speaker".to_string()
        }
    }

    #[test]
    fn playback_failure_is_contained() {
        let mut notifier = AlertNotifier::new(Box::new(BrokenSpeaker));
        assert!(notifier.notify("Class: person").is_ok());
        assert!(notifier.notify("Class: person").is_ok());
        assert_eq!(notifier.delivered(), 2);
        assert_eq!(notifier.playback_failures(), 2);
    }

    #[test]
    fn successful_playback_counts_delivery() {
        let mut notifier = AlertNotifier::new(Box::new(CountingSpeaker(0)));
        notifier.notify("Class: person").unwrap();
        assert_eq!(notifier.delivered(), 1);
        assert_eq!(notifier.playback_failures(), 0);
    }
}
