//! Named receiver operations on top of [`EiscpClient`].
//!
//! Setters are fire-and-forget: the command is written and the call returns
//! without waiting for the receiver's acknowledgement. The client discards
//! that acknowledgement before its next write. Typed reads send a status
//! query and parse the reply; they return `Ok(None)` when the receiver
//! stays silent.

use tracing::debug;

use eiscp_core::error::{Error, Result};
use eiscp_core::types::Zone;

use crate::client::EiscpClient;
use crate::commands::{
    self, AUDIO_MUTING, Command, INPUT_SELECTOR, MASTER_VOLUME, MAX_VOLUME_STEP, POWER,
    parse_input, parse_mute, parse_power, parse_volume,
};
use crate::protocol::parse_response;

impl EiscpClient {
    async fn fire(&self, command: Command) -> Result<()> {
        self.execute(&command, false, self.command_timeout())
            .await
            .map(|_| ())
    }

    /// Power the zone on (`PWR01`).
    pub async fn turn_on(&self, zone: Zone) -> Result<()> {
        self.fire(commands::power_on(zone)).await
    }

    /// Put the zone in standby (`PWR00`).
    pub async fn turn_off(&self, zone: Zone) -> Result<()> {
        self.fire(commands::power_off(zone)).await
    }

    /// Raise the volume one step (`MVLUP`).
    pub async fn volume_up(&self, zone: Zone) -> Result<()> {
        self.fire(commands::volume_up(zone)).await
    }

    /// Lower the volume one step (`MVLDOWN`).
    pub async fn volume_down(&self, zone: Zone) -> Result<()> {
        self.fire(commands::volume_down(zone)).await
    }

    /// Set an absolute volume step, clamped to `0..=255`.
    pub async fn set_volume_step(&self, step: i64, zone: Zone) -> Result<()> {
        self.fire(commands::volume_step(step, zone)).await
    }

    /// Map a `0.0..=1.0` level onto `resolution` steps and apply it.
    ///
    /// Returns the step that was sent: `round(level * resolution)` clamped
    /// to `[0, resolution]`. A resolution above 255 is rejected with
    /// [`Error::InvalidParameter`] since no larger step can be sent.
    pub async fn set_volume_level(&self, level: f32, resolution: u16, zone: Zone) -> Result<u16> {
        let step = level_to_step(level, resolution)?;
        debug!(level, resolution, step, "volume level mapped to step");
        self.set_volume_step(i64::from(step), zone).await?;
        Ok(step)
    }

    /// Mute or unmute (`AMT01` / `AMT00`).
    pub async fn set_mute(&self, on: bool, zone: Zone) -> Result<()> {
        self.fire(commands::mute(on, zone)).await
    }

    /// Switch to the input with the given `SLI` code.
    pub async fn select_input(&self, code: &str, zone: Zone) -> Result<()> {
        self.fire(commands::select_input(code, zone)).await
    }

    /// Whether the zone is powered on.
    pub async fn power_state(&self, zone: Zone) -> Result<Option<bool>> {
        match self.query_argument(POWER, zone).await? {
            Some(arg) => parse_power(&arg).map(Some),
            None => Ok(None),
        }
    }

    /// Current volume step. `None` when silent or reported as `N/A`.
    pub async fn volume(&self, zone: Zone) -> Result<Option<u16>> {
        match self.query_argument(MASTER_VOLUME, zone).await? {
            Some(arg) => parse_volume(&arg),
            None => Ok(None),
        }
    }

    /// Whether audio is muted. `None` when silent or reported as `N/A`.
    pub async fn is_muted(&self, zone: Zone) -> Result<Option<bool>> {
        match self.query_argument(AUDIO_MUTING, zone).await? {
            Some(arg) => parse_mute(&arg),
            None => Ok(None),
        }
    }

    /// `SLI` code of the selected input.
    pub async fn input(&self, zone: Zone) -> Result<Option<String>> {
        match self.query_argument(INPUT_SELECTOR, zone).await? {
            Some(arg) => parse_input(&arg).map(Some),
            None => Ok(None),
        }
    }

    /// Query `code` and return the reply's argument.
    ///
    /// The client only hands back a reply carrying the queried code.
    async fn query_argument(&self, code: &str, zone: Zone) -> Result<Option<String>> {
        let Some(text) = self.query(code, zone).await? else {
            return Ok(None);
        };
        let response = parse_response(&text)
            .ok_or_else(|| Error::Protocol(format!("unparseable reply: {:?}", text.trim_end())))?;
        Ok(Some(response.argument))
    }
}

/// Round `level * resolution` and clamp it to `[0, resolution]`.
pub fn level_to_step(level: f32, resolution: u16) -> Result<u16> {
    if level.is_nan() {
        return Err(Error::InvalidParameter("volume level is NaN".into()));
    }
    if resolution > u16::from(MAX_VOLUME_STEP) {
        return Err(Error::InvalidParameter(format!(
            "volume resolution {resolution} exceeds {MAX_VOLUME_STEP}"
        )));
    }
    let scaled = (f64::from(level) * f64::from(resolution)).round();
    Ok(scaled.clamp(0.0, f64::from(resolution)) as u16)
}
