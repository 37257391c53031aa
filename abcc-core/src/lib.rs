//! Anybus CompactCom protocol core data types
//!
//! This crate provides the protocol vocabulary shared by other abcc crates: command codes,
//! object numbers, error codes carried by error responses, and the little-endian scalar codec
//! used to access message payloads.
//! Stack users should not depend on this crate directly. Use `abcc::core` reexport instead.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Message header command byte layout
pub mod header {
    /// Error bit, set in error responses
    pub const E_BIT: u8 = 0x80;
    /// Command bit, set in commands and clear in responses
    pub const C_BIT: u8 = 0x40;
    /// Command code bits
    pub const CMD_BITS: u8 = 0x3F;
}

/// Message command code
///
/// Codes below `Command::OBJECT_SPECIFIC` are common to all objects; the remaining range is
/// defined by each object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command(u8);

impl Command {
    pub const NUL: Command = Command(0x00);
    pub const GET_ATTR: Command = Command(0x01);
    pub const SET_ATTR: Command = Command(0x02);
    pub const CREATE: Command = Command(0x03);
    pub const DELETE: Command = Command(0x04);
    pub const RESET: Command = Command(0x05);
    pub const GET_ENUM_STR: Command = Command(0x06);
    pub const GET_INDEXED_ATTR: Command = Command(0x07);
    pub const SET_INDEXED_ATTR: Command = Command(0x08);
    pub const OBJECT_SPECIFIC: Command = Command(0x10);

    pub const MAX: Command = Command(header::CMD_BITS);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= header::CMD_BITS {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & header::CMD_BITS)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<Command> for u8 {
    fn from(value: Command) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for Command {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// Object number addressed by a message
///
/// Module objects occupy the low range, host objects (implemented by the application)
/// the high range.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectNumber(u8);

impl ObjectNumber {
    /// Anybus object
    pub const ANB: ObjectNumber = ObjectNumber(0x01);
    /// Diagnostic object
    pub const DI: ObjectNumber = ObjectNumber(0x02);
    /// Network object
    pub const NW: ObjectNumber = ObjectNumber(0x03);
    /// Network configuration object
    pub const NC: ObjectNumber = ObjectNumber(0x04);
    /// Assembly mapping object
    pub const ASM: ObjectNumber = ObjectNumber(0xEB);
    /// Sync object
    pub const SYNC: ObjectNumber = ObjectNumber(0xEE);
    /// EtherCAT object
    pub const ECT: ObjectNumber = ObjectNumber(0xF5);
    /// PROFINET IO object
    pub const PNIO: ObjectNumber = ObjectNumber(0xF6);
    /// CC-Link object
    pub const CCL: ObjectNumber = ObjectNumber(0xF7);
    /// EtherNet/IP object
    pub const EIP: ObjectNumber = ObjectNumber(0xF8);
    /// Ethernet object
    pub const ETN: ObjectNumber = ObjectNumber(0xF9);
    /// Modbus object
    pub const MOD: ObjectNumber = ObjectNumber(0xFA);
    /// CANopen object
    pub const COP: ObjectNumber = ObjectNumber(0xFB);
    /// DeviceNet object
    pub const DEV: ObjectNumber = ObjectNumber(0xFC);
    /// PROFIBUS DP-V1 object
    pub const DPV1: ObjectNumber = ObjectNumber(0xFD);
    /// Application data object
    pub const APPD: ObjectNumber = ObjectNumber(0xFE);
    /// Application object
    pub const APP: ObjectNumber = ObjectNumber(0xFF);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for ObjectNumber {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<ObjectNumber> for u8 {
    fn from(value: ObjectNumber) -> Self {
        value.into_u8()
    }
}

/// Error code carried in the first payload byte of an error response
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseError(u8);

impl ResponseError {
    pub const INV_MSG_FORMAT: ResponseError = ResponseError(0x02);
    pub const UNSUP_OBJ: ResponseError = ResponseError(0x03);
    pub const UNSUP_INST: ResponseError = ResponseError(0x04);
    pub const UNSUP_CMD: ResponseError = ResponseError(0x05);
    pub const INV_CMD_EXT_0: ResponseError = ResponseError(0x06);
    pub const INV_CMD_EXT_1: ResponseError = ResponseError(0x07);
    pub const ATTR_NOT_SETABLE: ResponseError = ResponseError(0x08);
    pub const ATTR_NOT_GETABLE: ResponseError = ResponseError(0x09);
    pub const TOO_MUCH_DATA: ResponseError = ResponseError(0x0A);
    pub const NOT_ENOUGH_DATA: ResponseError = ResponseError(0x0B);
    pub const OUT_OF_RANGE: ResponseError = ResponseError(0x0C);
    pub const INV_STATE: ResponseError = ResponseError(0x0D);
    pub const NO_RESOURCES: ResponseError = ResponseError(0x0E);
    pub const SEG_FAILURE: ResponseError = ResponseError(0x0F);
    pub const SEG_BUF_OVERFLOW: ResponseError = ResponseError(0x10);
    pub const VAL_TOO_HIGH: ResponseError = ResponseError(0x11);
    pub const VAL_TOO_LOW: ResponseError = ResponseError(0x12);
    pub const CONTROLLED_FROM_OTHER_CHANNEL: ResponseError = ResponseError(0x13);
    pub const MSG_CHANNEL_TOO_SMALL: ResponseError = ResponseError(0x14);
    pub const GENERAL_ERROR: ResponseError = ResponseError(0x15);
    pub const PROTECTED_ACCESS: ResponseError = ResponseError(0x16);
    pub const DATA_NOT_AVAILABLE: ResponseError = ResponseError(0x17);
    /// The error is described by an object specific code in the second payload byte
    pub const OBJ_SPECIFIC: ResponseError = ResponseError(0xFF);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for ResponseError {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<ResponseError> for u8 {
    fn from(value: ResponseError) -> Self {
        value.into_u8()
    }
}

/// Attributes common to instance 0 of every object
pub mod object_attr {
    pub const NAME: u8 = 1;
    pub const REVISION: u8 = 2;
    pub const NUM_INSTANCES: u8 = 3;
    pub const HIGHEST_INSTANCE: u8 = 4;
}

/// Reset command type carried in command extension 1
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetType {
    PowerOn,
    Factory,
    PowerOnFactory,
    Other(u8),
}

impl From<u8> for ResetType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ResetType::PowerOn,
            0x01 => ResetType::Factory,
            0x02 => ResetType::PowerOnFactory,
            other => ResetType::Other(other),
        }
    }
}

impl From<ResetType> for u8 {
    fn from(value: ResetType) -> Self {
        match value {
            ResetType::PowerOn => 0x00,
            ResetType::Factory => 0x01,
            ResetType::PowerOnFactory => 0x02,
            ResetType::Other(other) => other,
        }
    }
}

/// Fixed-width value with a little-endian wire encoding
pub trait Scalar: Copy {
    const SIZE: usize;

    /// Decodes from the first `SIZE` bytes. `bytes` must be long enough.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encodes into the first `SIZE` bytes. `bytes` must be long enough.
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = core::mem::size_of::<$t>();

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; core::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                fn write_le(self, bytes: &mut [u8]) {
                    bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_truncation() {
        assert_eq!(Command::from_u8_truncating(0x41), Command::GET_ATTR);
        assert_eq!(Command::from_u8_truncating(0xC5), Command::RESET);
        assert!(Command::new(0x40).is_none());
        assert_eq!(Command::try_from(0x3F).unwrap(), Command::MAX);
    }

    #[test]
    fn test_reset_type_codes() {
        assert_eq!(ResetType::from(0x01), ResetType::Factory);
        assert_eq!(ResetType::from(0x07), ResetType::Other(0x07));
        assert_eq!(u8::from(ResetType::PowerOnFactory), 0x02);
    }

    #[test]
    fn test_scalar_little_endian() {
        let mut bytes = [0u8; 6];
        0x1234u16.write_le(&mut bytes[1..]);
        assert_eq!(bytes, [0x00, 0x34, 0x12, 0x00, 0x00, 0x00]);

        (-2i32).write_le(&mut bytes[2..]);
        assert_eq!(&bytes[2..], &[0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(i32::read_le(&bytes[2..]), -2);
        assert_eq!(u8::read_le(&bytes[1..]), 0x34);
    }
}
