// Rust Ethrelay Wire Library
// Written in 2026 by
//   Ethrelay Developers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//

//! A tokio-codec for envelope frames.
//!
//! Frame layout: a 4-byte big-endian length prefix covering the rest of the
//! frame, one message-code byte, then the RLP payload. This is the plaintext
//! framed contract the session layer exposes after its own handshake; it is
//! also what the in-memory test transports speak.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Envelope, MessageId, WireError};

/// Upper bound on a single frame, a sanity limit against hostile peers.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// The envelope tokio-codec for decoding and encoding frames.
pub enum EnvelopeCodec {
    /// Waiting for the length prefix.
    WaitingForLength,
    /// Waiting for a frame of the given length.
    WaitingForFrame(usize),
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::WaitingForLength
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self {
                Self::WaitingForLength => {
                    if src.len() < 4 {
                        return Ok(None);
                    }

                    let len = usize::try_from(src.get_u32()).expect("u32 fits in usize");
                    if len == 0 {
                        return Err(WireError::TruncatedFrame);
                    }
                    if len > MAX_FRAME_SIZE {
                        return Err(WireError::FrameTooLarge(len));
                    }

                    *self = Self::WaitingForFrame(len);
                }
                Self::WaitingForFrame(len) => {
                    let len = *len;
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }

                    *self = Self::WaitingForLength;

                    let code = src.get_u8();
                    let id = MessageId::from_code(code)
                        .ok_or(WireError::UnknownMessageCode(code))?;

                    return Ok(Some(Envelope {
                        id,
                        payload: src.copy_to_bytes(len - 1),
                    }));
                }
            }
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = WireError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame_len = 1 + item.payload.len();
        if frame_len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge(frame_len));
        }

        dst.reserve(4 + frame_len);
        dst.put_u32(u32::try_from(frame_len).expect("frame length checked against limit"));
        dst.put_u8(item.id.code());
        dst.put_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use proptest::prelude::*;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{EnvelopeCodec, MAX_FRAME_SIZE};
    use crate::message::{Envelope, MessageId, WireError};

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&[0, 0, 0]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[3, 0x02, 0xaa]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[0xbb]);
        let env = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(env.id, MessageId::Transactions);
        assert_eq!(env.payload.as_ref(), &[0xaa, 0xbb]);
    }

    #[test]
    fn unknown_code_is_rejected() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::from(&[0, 0, 0, 1, 0x0c][..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(WireError::UnknownMessageCode(0x0c))
        ));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = EnvelopeCodec::default();
        let len = u32::try_from(MAX_FRAME_SIZE + 1).unwrap();
        let mut buf = BytesMut::from(len.to_be_bytes().as_slice());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(WireError::FrameTooLarge(_))
        ));
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(code in 0u8..=0x11, payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let Some(id) = MessageId::from_code(code) else {
                return Ok(());
            };

            let env = Envelope::new(id, Bytes::from(payload));
            let mut codec = EnvelopeCodec::default();
            let mut buf = BytesMut::new();
            codec.encode(env.clone(), &mut buf).unwrap();

            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            prop_assert_eq!(decoded, env);
            prop_assert!(buf.is_empty());
        }
    }
}
