//! Hardware ports consumed by the core.
//!
//! The IR emitter, sound sink, battery sensor and boot button are real
//! drivers on the device; here they are traits injected at wiring time,
//! with no-op implementations for hosts and tests.

use std::sync::Arc;

/// Sound ids dispatched through [`SoundPort`]; the admin protocol's
/// `remote_sound` accepts the same range.
pub const SOUND_SHOT: u8 = 0;
pub const SOUND_HIT: u8 = 1;
pub const SOUND_RESPAWN: u8 = 2;
pub const SOUND_GAME_OVER: u8 = 3;
pub const MAX_SOUND_ID: u8 = 3;

/// Drives the IR LED with one encoded 32-bit laser frame.
pub trait LaserTx: Send + Sync {
    fn emit(&self, frame: u32);
}

/// Dispatches a sound id to the audio driver. No synthesis happens in
/// the core.
pub trait SoundPort: Send + Sync {
    fn play(&self, sound_id: u8);
}

/// Battery voltage sensor.
pub trait BatteryProbe: Send + Sync {
    fn voltage(&self) -> f32;
}

/// The physical reset button, sampled once at boot.
pub trait BootButton: Send + Sync {
    /// How long the button has been held at boot, in milliseconds.
    fn held_ms(&self) -> u32;
}

pub struct NullLaser;

impl LaserTx for NullLaser {
    fn emit(&self, frame: u32) {
        tracing::debug!(frame = format_args!("{frame:#010x}"), "laser frame emitted");
    }
}

pub struct NullSound;

impl SoundPort for NullSound {
    fn play(&self, sound_id: u8) {
        tracing::debug!(sound_id, "sound dispatched");
    }
}

pub struct ConstBattery(pub f32);

impl BatteryProbe for ConstBattery {
    fn voltage(&self) -> f32 {
        self.0
    }
}

pub struct ReleasedButton;

impl BootButton for ReleasedButton {
    fn held_ms(&self) -> u32 {
        0
    }
}

/// The bundle of hardware ports handed to the router.
#[derive(Clone)]
pub struct Ports {
    pub laser: Arc<dyn LaserTx>,
    pub sound: Arc<dyn SoundPort>,
    pub battery: Arc<dyn BatteryProbe>,
}

impl Ports {
    /// Host/test wiring: everything stubbed.
    pub fn null() -> Self {
        Self {
            laser: Arc::new(NullLaser),
            sound: Arc::new(NullSound),
            battery: Arc::new(ConstBattery(3.9)),
        }
    }
}
