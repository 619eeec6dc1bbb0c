// Reverie
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Control messages as Open Sound Control packets.
//!
//! This lets a synthesizer running in another process, or on another machine, be driven over
//! UDP. Each [`ControlMessage`] maps to one OSC message:
//!
//! | Address        | Arguments |
//! |----------------|-----------|
//! | `/voice/on`    | note id (`h`), when (`d`), frequency (`f`), velocity (`f`), attack (`f`), release (`f`), cutoff (`f`), resonance (`f`), distortion (`f`), waveform (`s`), oscillators (`i`), detune (`f`), glide (`f`), technique (`s`), pulse interval (`f`), group (`i`) |
//! | `/voice/off`   | note id (`h`), when (`d`) |
//! | `/voice/clear` | when (`d`) |
//!
//! Several messages can travel together in a bundle with [`encode_all`]. Bundles are applied
//! as soon as they are received; the timing lives in each message's `when`.
//!
//! ```
//! use reverie::synth::{control::ControlMessage, osc};
//!
//! let message = ControlMessage::NoteOff { note_id: 12, when: 3.5 };
//! let bytes = osc::encode(&message)?;
//! assert_eq!(osc::decode(&bytes)?, vec![message]);
//! # reverie::synth::osc::Result::Ok(())
//! ```

use crate::synth::control::{ControlMessage, NoteParams, VoiceTechnique, Waveform};
use rosc::{OscBundle, OscError, OscMessage, OscPacket, OscType};
use std::vec;
use thiserror::Error;

pub const NOTE_ON: &str = "/voice/on";
pub const NOTE_OFF: &str = "/voice/off";
pub const CLEAR: &str = "/voice/clear";

// An OSC time tag of 1 means "immediately".
const IMMEDIATELY: (u32, u32) = (0, 1);

/// A specialized [`Result`] type for OSC encoding and decoding.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when a packet cannot be encoded or understood.
#[derive(Debug, Error)]
pub enum Error {
    #[error("encoding OSC packet: {0:?}")]
    Encode(OscError),
    #[error("decoding OSC packet: {0:?}")]
    Decode(OscError),
    #[error("unknown address {0}")]
    UnknownAddress(String),
    #[error("{addr}: expected {expected} for argument {index}")]
    Argument {
        addr: &'static str,
        index: usize,
        expected: &'static str,
    },
    #[error("{addr}: unexpected trailing arguments")]
    TrailingArguments { addr: &'static str },
    #[error("{0}: unknown name {1:?}")]
    UnknownName(&'static str, String),
}

/// Encodes one control message as an OSC message packet.
pub fn encode(message: &ControlMessage) -> Result<Vec<u8>> {
    rosc::encoder::encode(&OscPacket::Message(to_osc(message))).map_err(Error::Encode)
}

/// Encodes several control messages as one OSC bundle.
pub fn encode_all(messages: &[ControlMessage]) -> Result<Vec<u8>> {
    let bundle = OscBundle {
        timetag: IMMEDIATELY.into(),
        content: messages
            .iter()
            .map(|message| OscPacket::Message(to_osc(message)))
            .collect(),
    };
    rosc::encoder::encode(&OscPacket::Bundle(bundle)).map_err(Error::Encode)
}

/// Decodes a packet into the control messages it contains, flattening nested bundles.
pub fn decode(bytes: &[u8]) -> Result<Vec<ControlMessage>> {
    let packet = rosc::decoder::decode(bytes).map_err(Error::Decode)?;
    let mut messages = Vec::new();
    collect(packet, &mut messages)?;
    Ok(messages)
}

fn collect(packet: OscPacket, messages: &mut Vec<ControlMessage>) -> Result<()> {
    match packet {
        OscPacket::Message(message) => messages.push(from_osc(message)?),
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                collect(packet, messages)?;
            }
        }
    }
    Ok(())
}

/// Converts a control message into an OSC message.
pub fn to_osc(message: &ControlMessage) -> OscMessage {
    match *message {
        ControlMessage::NoteOn {
            note_id,
            when,
            frequency,
            velocity,
            params,
        } => Message::addr(NOTE_ON)
            .arg(note_id as i64)
            .arg(when)
            .arg(frequency)
            .arg(velocity)
            .arg(params.attack)
            .arg(params.release)
            .arg(params.cutoff)
            .arg(params.resonance)
            .arg(params.distortion)
            .arg(waveform_name(params.waveform).to_owned())
            .arg(params.oscillators as i32)
            .arg(params.detune)
            .arg(params.glide)
            .arg(technique_name(params.technique).to_owned())
            .arg(params.pulse_interval)
            .arg(params.group as i32)
            .into_osc(),
        ControlMessage::NoteOff { note_id, when } => Message::addr(NOTE_OFF)
            .arg(note_id as i64)
            .arg(when)
            .into_osc(),
        ControlMessage::Clear { when } => Message::addr(CLEAR).arg(when).into_osc(),
    }
}

/// Converts an OSC message into a control message.
///
/// The message is not validated. [`Synth`](super::Synth) validates every message it receives.
pub fn from_osc(message: OscMessage) -> Result<ControlMessage> {
    let addr = match message.addr.as_str() {
        NOTE_ON => NOTE_ON,
        NOTE_OFF => NOTE_OFF,
        CLEAR => CLEAR,
        _ => return Err(Error::UnknownAddress(message.addr.clone())),
    };
    let mut args = Args::new(addr, message.args);
    let control = match addr {
        NOTE_ON => {
            let note_id = args.long()? as u64;
            let when = args.double()?;
            let frequency = args.float()?;
            let velocity = args.float()?;
            let params = NoteParams {
                attack: args.float()?,
                release: args.float()?,
                cutoff: args.float()?,
                resonance: args.float()?,
                distortion: args.float()?,
                waveform: waveform_from_name(addr, &args.string()?)?,
                oscillators: args.int()?.clamp(0, u8::MAX as i32) as u8,
                detune: args.float()?,
                glide: args.float()?,
                technique: technique_from_name(addr, &args.string()?)?,
                pulse_interval: args.float()?,
                group: args.int()?.clamp(0, u8::MAX as i32) as u8,
            };
            ControlMessage::NoteOn {
                note_id,
                when,
                frequency,
                velocity,
                params,
            }
        }
        NOTE_OFF => ControlMessage::NoteOff {
            note_id: args.long()? as u64,
            when: args.double()?,
        },
        _ => ControlMessage::Clear {
            when: args.double()?,
        },
    };
    args.finish()?;
    Ok(control)
}

struct Message(OscMessage);

impl Message {
    fn addr(addr: &str) -> Message {
        Message(OscMessage {
            addr: addr.to_owned(),
            args: Vec::new(),
        })
    }

    fn arg<T: Into<OscType>>(mut self, arg: T) -> Message {
        self.0.args.push(arg.into());
        self
    }

    fn into_osc(self) -> OscMessage {
        self.0
    }
}

/// Reads the arguments of a message in order.
struct Args {
    addr: &'static str,
    args: vec::IntoIter<OscType>,
    index: usize,
}

impl Args {
    fn new(addr: &'static str, args: Vec<OscType>) -> Args {
        Args {
            addr,
            args: args.into_iter(),
            index: 0,
        }
    }

    fn next<T>(
        &mut self,
        expected: &'static str,
        f: impl FnOnce(OscType) -> Option<T>,
    ) -> Result<T> {
        let index = self.index;
        self.index += 1;
        self.args.next().and_then(f).ok_or(Error::Argument {
            addr: self.addr,
            index,
            expected,
        })
    }

    fn int(&mut self) -> Result<i32> {
        self.next("an int", |arg| match arg {
            OscType::Int(x) => Some(x),
            _ => None,
        })
    }

    // Ints are accepted for ids so that clients without 64-bit integers can send them.
    fn long(&mut self) -> Result<i64> {
        self.next("a long", |arg| match arg {
            OscType::Long(x) => Some(x),
            OscType::Int(x) => Some(x as i64),
            _ => None,
        })
    }

    fn float(&mut self) -> Result<f32> {
        self.next("a float", |arg| match arg {
            OscType::Float(x) => Some(x),
            _ => None,
        })
    }

    fn double(&mut self) -> Result<f64> {
        self.next("a double", |arg| match arg {
            OscType::Double(x) => Some(x),
            OscType::Float(x) => Some(x as f64),
            _ => None,
        })
    }

    fn string(&mut self) -> Result<String> {
        self.next("a string", |arg| match arg {
            OscType::String(x) => Some(x),
            _ => None,
        })
    }

    fn finish(mut self) -> Result<()> {
        match self.args.next() {
            Some(_) => Err(Error::TrailingArguments { addr: self.addr }),
            None => Ok(()),
        }
    }
}

fn waveform_name(waveform: Waveform) -> &'static str {
    match waveform {
        Waveform::Sine => "sine",
        Waveform::Triangle => "triangle",
        Waveform::Saw => "saw",
        Waveform::Square => "square",
        Waveform::Noise => "noise",
        Waveform::Fat => "fat",
    }
}

fn waveform_from_name(addr: &'static str, name: &str) -> Result<Waveform> {
    Ok(match name {
        "sine" => Waveform::Sine,
        "triangle" => Waveform::Triangle,
        "saw" => Waveform::Saw,
        "square" => Waveform::Square,
        "noise" => Waveform::Noise,
        "fat" => Waveform::Fat,
        _ => return Err(Error::UnknownName(addr, name.to_owned())),
    })
}

fn technique_name(technique: VoiceTechnique) -> &'static str {
    match technique {
        VoiceTechnique::Sustain => "sustain",
        VoiceTechnique::Percussive => "percussive",
        VoiceTechnique::Pulse => "pulse",
    }
}

fn technique_from_name(addr: &'static str, name: &str) -> Result<VoiceTechnique> {
    Ok(match name {
        "sustain" => VoiceTechnique::Sustain,
        "percussive" => VoiceTechnique::Percussive,
        "pulse" => VoiceTechnique::Pulse,
        _ => return Err(Error::UnknownName(addr, name.to_owned())),
    })
}
