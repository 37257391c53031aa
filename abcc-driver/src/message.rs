//! Message wire layout

use abcc_core::{Command, ObjectNumber, ResponseError, Scalar, header};

/// Header length in octets
pub const HEADER_SIZE: usize = 12;

/// Largest payload any transport can carry
pub const MAX_DATA_SIZE: usize = 1524;

const DATA_SIZE: usize = 0;
const SOURCE_ID: usize = 4;
const DEST_OBJ: usize = 5;
const INSTANCE: usize = 6;
const CMD: usize = 8;
const CMD_EXT_0: usize = 10;
const CMD_EXT_1: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfBounds;

/// Header fields of a command message under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub object: ObjectNumber,
    pub instance: u16,
    pub command: Command,
    pub cmd_ext0: u8,
    pub cmd_ext1: u8,
    pub source_id: u8,
    pub data_size: u16,
}

/// A request or response message in its wire layout
///
/// Header fields are stored little-endian:
///
/// ```text
///  0      2      4    5    6      8    9    10   11   12
/// ┌──────┬──────┬────┬────┬──────┬────┬────┬────┬────┬─────────┐
/// │ size │ rsvd │ src│ obj│ inst │ cmd│rsvd│ext0│ext1│ payload │
/// └──────┴──────┴────┴────┴──────┴────┴────┴────┴────┴─────────┘
/// ```
///
/// The data size field is not checked against the payload capacity on write. Use
/// `data()` to obtain the bounded valid part.
#[derive(Clone)]
pub struct Message {
    raw: [u8; HEADER_SIZE + MAX_DATA_SIZE],
}

impl Message {
    pub const fn new() -> Self {
        Self {
            raw: [0; HEADER_SIZE + MAX_DATA_SIZE],
        }
    }

    /// Zeroes the header, leaving stale payload bytes in place
    pub fn clear_header(&mut self) {
        self.raw[..HEADER_SIZE].fill(0);
    }

    /// Fills the header of a command
    pub fn set_header(&mut self, header: Header) {
        self.clear_header();
        self.set_data_size(header.data_size);
        self.set_source_id(header.source_id);
        self.set_dest_obj(header.object);
        self.set_instance(header.instance);
        self.raw[CMD] = header.command.into_u8() | header::C_BIT;
        self.set_cmd_ext0(header.cmd_ext0);
        self.set_cmd_ext1(header.cmd_ext1);
    }

    /// Fills a get attribute command
    pub fn init_get_attribute(
        &mut self,
        object: ObjectNumber,
        instance: u16,
        attribute: u8,
        source_id: u8,
    ) {
        self.set_header(Header {
            object,
            instance,
            command: Command::GET_ATTR,
            cmd_ext0: attribute,
            cmd_ext1: 0,
            source_id,
            data_size: 0,
        });
    }

    /// Fills a set attribute command carrying a single octet
    pub fn init_set_byte_attribute(
        &mut self,
        object: ObjectNumber,
        instance: u16,
        attribute: u8,
        value: u8,
        source_id: u8,
    ) {
        self.set_header(Header {
            object,
            instance,
            command: Command::SET_ATTR,
            cmd_ext0: attribute,
            cmd_ext1: 0,
            source_id,
            data_size: 1,
        });
        self.raw[HEADER_SIZE] = value;
    }

    pub fn data_size(&self) -> u16 {
        u16::read_le(&self.raw[DATA_SIZE..])
    }

    pub fn set_data_size(&mut self, size: u16) {
        size.write_le(&mut self.raw[DATA_SIZE..]);
    }

    pub fn source_id(&self) -> u8 {
        self.raw[SOURCE_ID]
    }

    pub fn set_source_id(&mut self, id: u8) {
        self.raw[SOURCE_ID] = id;
    }

    pub fn dest_obj(&self) -> ObjectNumber {
        ObjectNumber::new(self.raw[DEST_OBJ])
    }

    pub fn set_dest_obj(&mut self, object: ObjectNumber) {
        self.raw[DEST_OBJ] = object.into_u8();
    }

    pub fn instance(&self) -> u16 {
        u16::read_le(&self.raw[INSTANCE..])
    }

    pub fn set_instance(&mut self, instance: u16) {
        instance.write_le(&mut self.raw[INSTANCE..]);
    }

    /// Raw command byte including the E and C bits
    pub fn cmd_byte(&self) -> u8 {
        self.raw[CMD]
    }

    pub fn set_cmd_byte(&mut self, value: u8) {
        self.raw[CMD] = value;
    }

    pub fn command(&self) -> Command {
        Command::from_u8_truncating(self.raw[CMD])
    }

    pub fn is_command(&self) -> bool {
        self.raw[CMD] & header::C_BIT != 0
    }

    pub fn is_error_response(&self) -> bool {
        self.raw[CMD] & header::E_BIT != 0
    }

    pub fn cmd_ext0(&self) -> u8 {
        self.raw[CMD_EXT_0]
    }

    pub fn set_cmd_ext0(&mut self, value: u8) {
        self.raw[CMD_EXT_0] = value;
    }

    pub fn cmd_ext1(&self) -> u8 {
        self.raw[CMD_EXT_1]
    }

    pub fn set_cmd_ext1(&mut self, value: u8) {
        self.raw[CMD_EXT_1] = value;
    }

    /// Valid payload part bounded by the data size field
    pub fn data(&self) -> &[u8] {
        let size = usize::from(self.data_size()).min(MAX_DATA_SIZE);
        &self.raw[HEADER_SIZE..HEADER_SIZE + size]
    }

    /// Whole payload area regardless of the data size field
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.raw[HEADER_SIZE..]
    }

    /// Turns a command into its response in place
    pub fn set_response(&mut self, data_size: u16) {
        self.raw[CMD] &= !(header::C_BIT | header::E_BIT);
        self.set_data_size(data_size);
    }

    /// Turns a command into an error response in place
    pub fn set_error_response(&mut self, error: ResponseError) {
        self.raw[CMD] = (self.raw[CMD] & !header::C_BIT) | header::E_BIT;
        self.raw[HEADER_SIZE] = error.into_u8();
        self.set_data_size(1);
    }

    /// Turns a command into an error response with an object specific error code
    pub fn set_object_specific_error(&mut self, code: u8) {
        self.set_error_response(ResponseError::OBJ_SPECIFIC);
        self.raw[HEADER_SIZE + 1] = code;
        self.set_data_size(2);
    }

    /// Error code of an error response
    pub fn response_error(&self) -> Option<ResponseError> {
        if self.is_error_response() && self.data_size() > 0 {
            Some(ResponseError::new(self.raw[HEADER_SIZE]))
        } else {
            None
        }
    }

    /// Reads a scalar at the payload octet offset
    ///
    /// Does not check the data size field.
    pub fn get<T: Scalar>(&self, offset: usize) -> Result<T, OutOfBounds> {
        let bytes = self.payload_range(offset, T::SIZE)?;
        Ok(T::read_le(bytes))
    }

    /// Writes a scalar at the payload octet offset
    ///
    /// Does not update the data size field.
    pub fn set<T: Scalar>(&mut self, offset: usize, value: T) -> Result<(), OutOfBounds> {
        let start = HEADER_SIZE + offset;
        self.payload_range(offset, T::SIZE)?;
        value.write_le(&mut self.raw[start..]);
        Ok(())
    }

    /// Copies a string into the payload at the octet offset
    pub fn set_string(&mut self, offset: usize, value: &[u8]) -> Result<(), OutOfBounds> {
        self.payload_range(offset, value.len())?;
        let start = HEADER_SIZE + offset;
        self.raw[start..start + value.len()].copy_from_slice(value);
        Ok(())
    }

    /// Borrows `len` payload octets at the offset
    pub fn get_string(&self, offset: usize, len: usize) -> Result<&[u8], OutOfBounds> {
        self.payload_range(offset, len)
    }

    fn payload_range(&self, offset: usize, len: usize) -> Result<&[u8], OutOfBounds> {
        let end = offset.checked_add(len).ok_or(OutOfBounds)?;
        if end > MAX_DATA_SIZE {
            return Err(OutOfBounds);
        }
        Ok(&self.raw[HEADER_SIZE + offset..HEADER_SIZE + end])
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Message")
            .field("data_size", &self.data_size())
            .field("source_id", &self.source_id())
            .field("dest_obj", &self.dest_obj())
            .field("instance", &self.instance())
            .field("cmd", &self.cmd_byte())
            .field("cmd_ext0", &self.cmd_ext0())
            .field("cmd_ext1", &self.cmd_ext1())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Message {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "Message {{ size: {}, src: {}, obj: {=u8:#x}, inst: {}, cmd: {=u8:#x}, ext: [{}, {}] }}",
            self.data_size(),
            self.source_id(),
            self.dest_obj().into_u8(),
            self.instance(),
            self.cmd_byte(),
            self.cmd_ext0(),
            self.cmd_ext1(),
        )
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    fn get_attr(source_id: u8) -> Message {
        let mut msg = Message::new();
        msg.set_header(Header {
            object: ObjectNumber::APP,
            instance: 0x0102,
            command: Command::GET_ATTR,
            cmd_ext0: 3,
            cmd_ext1: 0,
            source_id,
            data_size: 0,
        });
        msg
    }

    #[test]
    fn test_header_layout() {
        let mut msg = get_attr(7);
        msg.set_data_size(0x0304);
        assert_eq!(
            &msg.raw[..HEADER_SIZE],
            &[0x04, 0x03, 0x00, 0x00, 0x07, 0xFF, 0x02, 0x01, 0x41, 0x00, 0x03, 0x00]
        );
        assert!(msg.is_command());
        assert!(!msg.is_error_response());
        assert_eq!(msg.command(), Command::GET_ATTR);
    }

    #[test]
    fn test_response_clears_command_bit() {
        let mut msg = get_attr(1);
        msg.set::<u16>(0, 0x1234).unwrap();
        msg.set_response(2);
        assert!(!msg.is_command());
        assert_eq!(msg.command(), Command::GET_ATTR);
        assert_eq!(msg.data(), &[0x34, 0x12]);
    }

    #[test]
    fn test_error_response() {
        let mut msg = get_attr(1);
        msg.set_error_response(ResponseError::UNSUP_OBJ);
        assert_eq!(msg.cmd_byte(), 0x81);
        assert_eq!(msg.data(), &[0x03]);
        assert_eq!(msg.response_error(), Some(ResponseError::UNSUP_OBJ));

        msg.set_object_specific_error(0x42);
        assert_eq!(msg.data(), &[0xFF, 0x42]);
    }

    #[test]
    fn test_attribute_builders() {
        let mut msg = Message::new();
        msg.set_data_size(9);
        msg.init_get_attribute(ObjectNumber::NW, 1, 2, 9);
        assert_eq!(
            &msg.raw[..HEADER_SIZE],
            &[0x00, 0x00, 0x00, 0x00, 0x09, 0x03, 0x01, 0x00, 0x41, 0x00, 0x02, 0x00]
        );

        msg.init_set_byte_attribute(ObjectNumber::NW, 1, 5, 0xAB, 10);
        assert!(msg.is_command());
        assert_eq!(msg.command(), Command::SET_ATTR);
        assert_eq!(msg.cmd_ext0(), 5);
        assert_eq!(msg.source_id(), 10);
        assert_eq!(msg.data(), &[0xAB]);
    }

    #[test]
    fn test_payload_bounds() {
        let mut msg = Message::new();
        assert_eq!(msg.set::<u32>(MAX_DATA_SIZE - 3, 1), Err(OutOfBounds));
        assert_eq!(msg.set::<u32>(MAX_DATA_SIZE - 4, 1), Ok(()));
        assert_eq!(msg.get_string(usize::MAX, 2), Err(OutOfBounds));
        msg.set_string(2, b"abc").unwrap();
        assert_eq!(msg.get_string(2, 3).unwrap(), b"abc");
    }

    #[test]
    fn test_data_bounded_by_capacity() {
        let mut msg = Message::new();
        msg.set_data_size(u16::MAX);
        assert_eq!(msg.data().len(), MAX_DATA_SIZE);
    }
}
