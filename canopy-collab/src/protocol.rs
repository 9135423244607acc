//! Binary wire protocol for document synchronization.
//!
//! Every frame starts with a varint message type:
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ type: varint │ payload                                      │
//! ├──────────────┼──────────────────────────────────────────────┤
//! │ 0 (sync)     │ varint sub-type, varint length, bytes        │
//! │ 1 (presence) │ varint length, bytes (opaque, relayed as is) │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//! Sync sub-types: 0 = step 1 (state vector), 1 = step 2 (diff),
//! 2 = incremental update.  Varints are unsigned LEB128.

use thiserror::Error;

pub const MSG_SYNC: u64 = 0;
pub const MSG_AWARENESS: u64 = 1;

pub const SYNC_STEP1: u64 = 0;
pub const SYNC_STEP2: u64 = 1;
pub const SYNC_UPDATE: u64 = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame ended unexpectedly")]
    UnexpectedEof,
    #[error("varint does not fit in 64 bits")]
    VarintOverflow,
    #[error("unknown sync message type {0}")]
    UnknownSyncType(u64),
    #[error("payload length {0} exceeds frame")]
    LengthOverflow(u64),
}

/// Payload of a type-0 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Encoded state vector of the sender.
    Step1(Vec<u8>),
    /// Update with everything the step-1 sender was missing.
    Step2(Vec<u8>),
    Update(Vec<u8>),
}

impl SyncMessage {
    fn tag(&self) -> u64 {
        match self {
            Self::Step1(_) => SYNC_STEP1,
            Self::Step2(_) => SYNC_STEP2,
            Self::Update(_) => SYNC_UPDATE,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::Step1(p) | Self::Step2(p) | Self::Update(p) => p,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Sync(SyncMessage),
    /// Opaque presence payload.
    Awareness(Vec<u8>),
    /// A message type this server does not handle.
    Unknown(u64),
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Sync(sync) => {
                let payload = sync.payload();
                let mut buf = Vec::with_capacity(payload.len() + 6);
                write_var_uint(&mut buf, MSG_SYNC);
                write_var_uint(&mut buf, sync.tag());
                write_var_bytes(&mut buf, payload);
                buf
            }
            Self::Awareness(payload) => {
                let mut buf = Vec::with_capacity(payload.len() + 5);
                write_var_uint(&mut buf, MSG_AWARENESS);
                write_var_bytes(&mut buf, payload);
                buf
            }
            Self::Unknown(kind) => {
                let mut buf = Vec::with_capacity(2);
                write_var_uint(&mut buf, *kind);
                buf
            }
        }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(frame);
        match reader.var_uint()? {
            MSG_SYNC => {
                let sub = reader.var_uint()?;
                let payload = reader.var_bytes()?.to_vec();
                match sub {
                    SYNC_STEP1 => Ok(Self::Sync(SyncMessage::Step1(payload))),
                    SYNC_STEP2 => Ok(Self::Sync(SyncMessage::Step2(payload))),
                    SYNC_UPDATE => Ok(Self::Sync(SyncMessage::Update(payload))),
                    other => Err(ProtocolError::UnknownSyncType(other)),
                }
            }
            MSG_AWARENESS => Ok(Self::Awareness(reader.var_bytes()?.to_vec())),
            other => Ok(Self::Unknown(other)),
        }
    }

    pub fn step1(state_vector: Vec<u8>) -> Self {
        Self::Sync(SyncMessage::Step1(state_vector))
    }

    pub fn step2(diff: Vec<u8>) -> Self {
        Self::Sync(SyncMessage::Step2(diff))
    }

    pub fn update(update: Vec<u8>) -> Self {
        Self::Sync(SyncMessage::Update(update))
    }
}

pub fn write_var_uint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_var_uint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Cursor over a frame.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn var_uint(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self.buf.get(self.pos).ok_or(ProtocolError::UnexpectedEof)?;
            self.pos += 1;
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(ProtocolError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub fn var_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.var_uint()?;
        let remaining = (self.buf.len() - self.pos) as u64;
        if len > remaining {
            return Err(ProtocolError::LengthOverflow(len));
        }
        let start = self.pos;
        self.pos += len as usize;
        Ok(&self.buf[start..self.pos])
    }
}
