// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Produced network frames and their byte layout.
//!
//! All fields are little endian:
//!
//! | field       | size                                         |
//! |-------------|----------------------------------------------|
//! | sequence    | u16                                          |
//! | channel tag | u8 stereo flag, or u16 sample count if silent |
//! | position    | 3 x f32                                      |
//! | orientation | 4 x f32 (x, y, z, w)                         |
//! | payload     | i16 per sample, omitted when silent          |

use bytes::{BufMut, Bytes, BytesMut};
use glam::{Quat, Vec3};

const POSE_LEN: usize = 3 * 4 + 4 * 4;

/// The audio carried by a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// No samples are sent; the receiver synthesizes this many zeros.
    Silent { samples: u16 },
    /// Interleaved samples.
    Audio(Vec<i16>),
}

/// One frame produced by an injector.
#[derive(Clone, Debug, PartialEq)]
pub struct InjectorFrame {
    pub sequence: u16,
    pub stereo: bool,
    pub position: Vec3,
    pub orientation: Quat,
    pub payload: Payload,
    /// Mean absolute sample value, normalized to [0, 1].
    pub loudness: f32,
}

impl InjectorFrame {
    pub fn is_silent(&self) -> bool {
        matches!(self.payload, Payload::Silent { .. })
    }

    /// Samples carried by the frame, if any.
    pub fn samples(&self) -> Option<&[i16]> {
        match &self.payload {
            Payload::Audio(samples) => Some(samples),
            Payload::Silent { .. } => None,
        }
    }

    /// Number of samples the frame represents, across all channels.
    pub fn sample_count(&self) -> usize {
        match &self.payload {
            Payload::Audio(samples) => samples.len(),
            Payload::Silent { samples } => *samples as usize,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match &self.payload {
            Payload::Silent { .. } => 2 + 2 + POSE_LEN,
            Payload::Audio(samples) => 2 + 1 + POSE_LEN + samples.len() * 2,
        }
    }

    /// Serializes the frame for the network collaborator.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u16_le(self.sequence);
        match &self.payload {
            Payload::Silent { samples } => buf.put_u16_le(*samples),
            Payload::Audio(_) => buf.put_u8(self.stereo as u8),
        }

        for v in self.position.to_array() {
            buf.put_f32_le(v);
        }
        for v in self.orientation.to_array() {
            buf.put_f32_le(v);
        }

        if let Payload::Audio(samples) = &self.payload {
            for sample in samples {
                buf.put_i16_le(*sample);
            }
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: Payload) -> InjectorFrame {
        InjectorFrame {
            sequence: 0x0102,
            stereo: true,
            position: Vec3::new(1.0, 2.0, 3.0),
            orientation: Quat::from_xyzw(0.0, 0.0, 0.0, 1.0),
            payload,
            loudness: 0.0,
        }
    }

    #[test]
    fn test_encode_audio() {
        let frame = frame(Payload::Audio(vec![1, -2]));
        let bytes = frame.encode();
        assert_eq!(bytes.len(), frame.encoded_len());
        assert_eq!(bytes.len(), 2 + 1 + 28 + 4);

        assert_eq!(&bytes[0..2], &[0x02, 0x01]);
        assert_eq!(bytes[2], 1);
        assert_eq!(&bytes[3..7], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[11..15], &3.0f32.to_le_bytes());
        assert_eq!(&bytes[27..31], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[31..33], &1i16.to_le_bytes());
        assert_eq!(&bytes[33..35], &(-2i16).to_le_bytes());
    }

    #[test]
    fn test_encode_silent() {
        let frame = frame(Payload::Silent { samples: 480 });
        let bytes = frame.encode();
        assert_eq!(bytes.len(), 2 + 2 + 28);
        assert_eq!(&bytes[2..4], &480u16.to_le_bytes());
        assert!(frame.is_silent());
        assert_eq!(frame.sample_count(), 480);
        assert!(frame.samples().is_none());
    }
}
