use std::io::Write;

use super::{AudioBackend, ToneHandle};
use crate::error::AudioError;

/// Audio for a terminal session: no tone synthesis, BEL characters on stderr.
#[derive(Debug, Default)]
pub struct TerminalAudio;

impl AudioBackend for TerminalAudio {
    fn open_tone(
        &mut self,
        _frequency_hz: f32,
        _volume: f32,
    ) -> Result<Box<dyn ToneHandle>, AudioError> {
        Err(AudioError::Unavailable(
            "terminal output cannot synthesize tones".into(),
        ))
    }

    fn ring_bell(&mut self) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}
