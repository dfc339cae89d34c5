use anyhow::{anyhow, Context, Result};
use opencv::core::{Mat, CV_8UC3};
use opencv::highgui;
use opencv::prelude::*;

use super::{DisplayEvent, DisplaySink};
use crate::frame::Frame;

const KEY_ESC: i32 = 27;
const KEY_Q: i32 = 113;

/// HighGUI window; `q` or Esc quits.
pub struct WindowDisplay {
    title: String,
    open: bool,
    // BGR staging buffer, reused across frames.
    bgr: Vec<u8>,
}

impl WindowDisplay {
    pub fn open(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("failed to create window '{}'", title))?;
        log::info!("display window '{}' opened", title);
        Ok(Self {
            title: title.to_string(),
            open: true,
            bgr: Vec::new(),
        })
    }
}

impl DisplaySink for WindowDisplay {
    fn show(&mut self, frame: &Frame) -> Result<DisplayEvent> {
        if !self.open {
            return Err(anyhow!("display window '{}' is closed", self.title));
        }
        self.bgr.clear();
        self.bgr.reserve(frame.pixels().len());
        for rgb in frame.pixels().chunks_exact(3) {
            self.bgr.extend_from_slice(&[rgb[2], rgb[1], rgb[0]]);
        }

        // SAFETY: `bgr` holds height * width * 3 bytes and outlives `mat`,
        // which is dropped at the end of this call.
        let mat = unsafe {
            Mat::new_rows_cols_with_data_unsafe(
                frame.height() as i32,
                frame.width() as i32,
                CV_8UC3,
                self.bgr.as_mut_ptr() as *mut _,
                opencv::core::Mat_AUTO_STEP,
            )
        }
        .context("failed to wrap frame for display")?;

        highgui::imshow(&self.title, &mat).context("failed to show frame")?;
        let key = highgui::wait_key(1).context("failed to poll keyboard")?;
        if key == KEY_ESC || key == KEY_Q {
            return Ok(DisplayEvent::Quit);
        }
        Ok(DisplayEvent::Continue)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            if let Err(err) = highgui::destroy_window(&self.title) {
                log::warn!("failed to close display window: {}", err);
            }
        }
    }

    fn describe(&self) -> String {
        format!("window '{}'", self.title)
    }
}

impl Drop for WindowDisplay {
    fn drop(&mut self) {
        self.close();
    }
}
