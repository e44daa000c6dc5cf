//! Controller macros.
//!
//! Between `MAC BEG` and `MAC END` the controller stores every received line
//! in the macro instead of executing it, so `ERR?` polling is suspended for
//! the whole recording.

use tracing::{debug, warn};

use super::Gcs2Commands;
use crate::core::command_line;
use crate::error::{GcsError, GcsResult};

impl Gcs2Commands {
    /// True while `MAC BEG` is recording.
    pub fn is_recording_macro(&self) -> bool {
        self.macro_errcheck.is_some()
    }

    /// `MAC BEG`: start recording macro `name`. Error polling stays off until
    /// [`mac_end`](Self::mac_end).
    pub fn mac_beg(&mut self, name: &str) -> GcsResult<()> {
        if self.macro_errcheck.is_some() {
            return Err(GcsError::InvalidArgument(
                "a macro is already being recorded".to_string(),
            ));
        }
        let msgs = self.core.messages_mut();
        let saved = msgs.errcheck();
        msgs.set_errcheck(false);
        if let Err(e) = msgs.send(&format!("MAC BEG {name}")) {
            msgs.set_errcheck(saved);
            return Err(e);
        }
        debug!("Recording macro {name}");
        self.macro_errcheck = Some(saved);
        Ok(())
    }

    /// `MAC END`: stop recording and restore error polling. If polling was
    /// on, `ERR?` reports errors raised while the macro was stored.
    pub fn mac_end(&mut self) -> GcsResult<()> {
        let Some(saved) = self.macro_errcheck.take() else {
            warn!("MAC END without MAC BEG");
            return self.core.send("MAC END");
        };
        let msgs = self.core.messages_mut();
        let sent = msgs.send("MAC END");
        msgs.set_errcheck(saved);
        sent?;
        if saved {
            msgs.check_error()?;
        }
        Ok(())
    }

    /// `MAC START`: run macro `name` once, with optional macro arguments.
    pub fn mac_start(&mut self, name: &str, args: Option<&str>) -> GcsResult<()> {
        let line = command_line(&format!("MAC START {name}"), args.unwrap_or_default());
        self.core.send(&line)
    }

    /// `MAC NSTART`: run macro `name` `times` times.
    pub fn mac_nstart(&mut self, name: &str, times: u32, args: Option<&str>) -> GcsResult<()> {
        let line = command_line(
            &format!("MAC NSTART {name} {times}"),
            args.unwrap_or_default(),
        );
        self.core.send(&line)
    }

    /// `MAC DEL`
    pub fn mac_del(&mut self, name: &str) -> GcsResult<()> {
        self.core.send(&format!("MAC DEL {name}"))
    }

    /// `MAC DEF`: run `name` at power-up. An empty name clears the startup macro.
    pub fn mac_def(&mut self, name: &str) -> GcsResult<()> {
        self.core.send(&command_line("MAC DEF", name))
    }

    /// `MAC DEF?`: the startup macro, empty if none.
    pub fn qmac_def(&mut self) -> GcsResult<String> {
        self.core.query_text("MAC DEF?")
    }

    /// `MAC?`: names of the stored macros, or the lines of macro `name`.
    pub fn qmac(&mut self, name: Option<&str>) -> GcsResult<Vec<String>> {
        let answer = self
            .core
            .read(&command_line("MAC?", name.unwrap_or_default()))?;
        Ok(answer
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Store `lines` as macro `name`. Error polling is restored even if a
    /// line fails to write.
    pub fn define_macro(&mut self, name: &str, lines: &[&str]) -> GcsResult<()> {
        self.mac_beg(name)?;
        let written = lines
            .iter()
            .try_for_each(|line| self.core.messages_mut().send(line));
        if let Err(e) = written {
            if let Some(saved) = self.macro_errcheck.take() {
                self.core.messages_mut().set_errcheck(saved);
            }
            return Err(e);
        }
        self.mac_end()
    }
}
