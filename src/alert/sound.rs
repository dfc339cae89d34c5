use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

use crate::config::AlertSettings;

/// Plays the alert clip. `play` blocks until playback has finished.
pub trait SoundPlayer {
    fn play(&mut self) -> Result<()>;

    fn describe(&self) -> String;
}

/// Plays a clip through an external player process (`aplay -q clip.wav`)
/// and waits for it to exit.
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    asset: PathBuf,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>, asset: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            asset: asset.into(),
        }
    }

    /// `command[0]` is the program, the rest are its leading arguments.
    pub fn from_command(command: &[String], asset: &Path) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("alert player command must not be empty"))?;
        Ok(Self::new(program.clone(), args.to_vec(), asset))
    }

    pub fn asset(&self) -> &Path {
        &self.asset
    }
}

impl SoundPlayer for CommandPlayer {
    fn play(&mut self) -> Result<()> {
        if !self.asset.is_file() {
            return Err(anyhow!(
                "alert sound {} does not exist",
                self.asset.display()
            ));
        }
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.asset)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("failed to start alert player {}", self.program))?;
        if !status.success() {
            return Err(anyhow!(
                "alert player {} exited with {}",
                self.program,
                status
            ));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} {}", self.program, self.asset.display())
    }
}

/// Rings the terminal bell on stderr.
#[derive(Default)]
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&mut self) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07").context("failed to ring terminal bell")?;
        stderr.flush().context("failed to ring terminal bell")?;
        Ok(())
    }

    fn describe(&self) -> String {
        "terminal bell".to_string()
    }
}

/// Player for the configured alert. A missing clip is reported now but is
/// not fatal; playback will fail (and be logged) at alert time.
pub fn build_player(settings: &AlertSettings) -> Result<Box<dyn SoundPlayer>> {
    let Some(asset) = &settings.sound_path else {
        log::info!("no alert sound configured, using terminal bell");
        return Ok(Box::new(TerminalBell));
    };
    if !asset.is_file() {
        log::warn!(
            "alert sound {} not found; alerts will be logged without audio",
            asset.display()
        );
    }
    Ok(Box::new(CommandPlayer::from_command(&settings.player, asset)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_asset_fails_playback() {
        let mut player = CommandPlayer::new("true", vec![], "/nonexistent/alert.wav");
        let err = player.play().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[cfg(unix)]
    #[test]
    fn successful_player_exit_is_ok() {
        let clip = tempfile::NamedTempFile::new().unwrap();
        let mut player = CommandPlayer::new("true", vec![], clip.path());
        assert!(player.play().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn failing_player_exit_is_an_error() {
        let clip = tempfile::NamedTempFile::new().unwrap();
        let mut player = CommandPlayer::new("false", vec![], clip.path());
        assert!(player.play().is_err());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandPlayer::from_command(&[], Path::new("alert.wav")).is_err());
    }

    #[test]
    fn no_sound_path_selects_bell() {
        let settings = AlertSettings {
            cooldown_secs: 30.0,
            sound_path: None,
            player: vec!["aplay".to_string()],
        };
        let player = build_player(&settings).unwrap();
        assert_eq!(player.describe(), "terminal bell");
    }
}
