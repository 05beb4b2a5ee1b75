pub mod terminal;

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::{MAX_TIMER, WatchConfig};
use crate::error::AudioError;

pub use terminal::TerminalAudio;

/// A live tone owned by exactly one ringing session.
pub trait ToneHandle: Send {
    fn set_volume(&mut self, volume: f32);
    /// Stop the tone and release the underlying resource.
    fn close(self: Box<Self>);
}

/// The platform audio facility.
pub trait AudioBackend: Send {
    /// Start a continuous tone at `volume`.
    fn open_tone(&mut self, frequency_hz: f32, volume: f32)
    -> Result<Box<dyn ToneHandle>, AudioError>;
    /// Emit one discrete audible bell.
    fn ring_bell(&mut self);
}

/// Parameters of a ringing session.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub frequency_hz: f32,
    pub volume: f32,
    pub pulse: Duration,
    pub drop_after: Duration,
    pub ceiling: Duration,
    pub fallback_beeps: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::from(&WatchConfig::default())
    }
}

impl From<&WatchConfig> for AudioSettings {
    fn from(config: &WatchConfig) -> Self {
        Self {
            frequency_hz: config.tone.frequency_hz,
            volume: config.tone.volume,
            pulse: config.timing.pulse(),
            drop_after: config.timing.drop_after(),
            ceiling: config.timing.ring(),
            fallback_beeps: config.tone.fallback_beeps,
        }
    }
}

enum Output {
    /// Pulsed tone. `silence_at` is the pending drop to zero volume, if any.
    Tone {
        handle: Box<dyn ToneHandle>,
        silence_at: Option<Instant>,
    },
    /// Discrete bells, used when no tone can be synthesized.
    Bell { remaining: u32 },
}

struct Ringing {
    output: Output,
    next_pulse: Instant,
    deadline: Instant,
}

/// The audio alert: `Idle` or `Ringing`, with at most one ringing session.
///
/// The state machine does not own timers. The caller asks for [`AudioAlert::next_deadline`],
/// sleeps until then, and calls [`AudioAlert::advance`]. Stopping drops every pending
/// deadline with the session.
pub struct AudioAlert {
    backend: Box<dyn AudioBackend>,
    settings: AudioSettings,
    ringing: Option<Ringing>,
}

impl AudioAlert {
    pub fn new(backend: Box<dyn AudioBackend>, mut settings: AudioSettings) -> Self {
        // Pulses must move forward in time or `advance` never catches up.
        settings.pulse = settings.pulse.clamp(Duration::from_millis(1), MAX_TIMER);
        settings.drop_after = settings.drop_after.min(MAX_TIMER);
        settings.ceiling = settings.ceiling.min(MAX_TIMER);
        Self {
            backend,
            settings,
            ringing: None,
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.ringing.is_some()
    }

    /// Whether the current session rings bells instead of a tone.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self.ringing,
            Some(Ringing {
                output: Output::Bell { .. },
                ..
            })
        )
    }

    /// Start ringing at `now`, stopping any session already ringing.
    pub fn start(&mut self, now: Instant) {
        self.stop();

        let settings = &self.settings;
        let output = match self.backend.open_tone(settings.frequency_hz, settings.volume) {
            Ok(handle) => Output::Tone {
                handle,
                silence_at: None,
            },
            Err(err) => {
                debug!(%err, "falling back to bell signals");
                if settings.fallback_beeps == 0 {
                    return;
                }
                self.backend.ring_bell();
                Output::Bell {
                    remaining: settings.fallback_beeps - 1,
                }
            }
        };

        self.ringing = Some(Ringing {
            output,
            next_pulse: now + settings.pulse,
            deadline: now + settings.ceiling,
        });
        debug!(ceiling = ?settings.ceiling, "audio alert ringing");
    }

    /// Stop ringing and release the tone. No-op when idle.
    pub fn stop(&mut self) {
        if let Some(ringing) = self.ringing.take() {
            if let Output::Tone { handle, .. } = ringing.output {
                handle.close();
            }
            debug!("audio alert stopped");
        }
    }

    /// The earliest instant at which [`AudioAlert::advance`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let ringing = self.ringing.as_ref()?;
        let mut next = ringing.deadline.min(ringing.next_pulse);
        if let Output::Tone {
            silence_at: Some(at),
            ..
        } = ringing.output
        {
            next = next.min(at);
        }
        Some(next)
    }

    /// Run every pulse, drop and ceiling due at or before `now`.
    pub fn advance(&mut self, now: Instant) {
        let Some(ringing) = self.ringing.as_mut() else {
            return;
        };
        if now >= ringing.deadline {
            self.stop();
            return;
        }

        let settings = &self.settings;
        let mut exhausted = false;
        loop {
            let silence_due = match ringing.output {
                Output::Tone {
                    silence_at: Some(at),
                    ..
                } => Some(at),
                _ => None,
            };
            // Process events in time order: a drop scheduled before the next pulse goes first.
            match silence_due {
                Some(at) if at <= now && at <= ringing.next_pulse => {
                    if let Output::Tone { handle, silence_at } = &mut ringing.output {
                        handle.set_volume(0.0);
                        *silence_at = None;
                    }
                }
                _ if ringing.next_pulse <= now => {
                    let pulse_at = ringing.next_pulse;
                    ringing.next_pulse = pulse_at + settings.pulse;
                    match &mut ringing.output {
                        Output::Tone { handle, silence_at } => {
                            handle.set_volume(settings.volume);
                            *silence_at = Some(pulse_at + settings.drop_after);
                        }
                        Output::Bell { remaining } => {
                            if *remaining > 0 {
                                self.backend.ring_bell();
                                *remaining -= 1;
                            }
                            if *remaining == 0 {
                                exhausted = true;
                                break;
                            }
                        }
                    }
                }
                _ => break,
            }
        }

        if exhausted {
            self.stop();
        }
    }
}

impl Drop for AudioAlert {
    fn drop(&mut self) {
        self.stop();
    }
}
