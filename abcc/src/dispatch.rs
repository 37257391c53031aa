//! Command dispatch engine
//!
//! Incoming commands are first offered to an optional catch hook, then matched against a static
//! table of `Entry` items. A matching entry answers the command without per-object code: it
//! reads a constant or calls a getter for `Get_Attribute`, calls a setter for `Set_Attribute`,
//! or calls a reset callback for `Reset`. Commands no entry answers fall through to the
//! registered `HostObject` processors. A command for an object nobody claims gets an
//! "unsupported object" error response.
//!
//! The table is scanned linearly and the first match wins, so table order encodes override
//! priority.

use crate::core::{Command, ObjectNumber, ResetType, ResponseError, Scalar};
use crate::error::{ErrorCode, Severity};
use crate::message::{MAX_DATA_SIZE, Message};
use crate::pool::MessageBuffer;

pub mod lookup;

/// Source of a fixed-width attribute value
#[derive(Debug, Clone, Copy)]
pub enum Value<T> {
    Const(T),
    Get(fn() -> T),
    Set(fn(T)),
}

/// Source of a string attribute value
///
/// `max_size` bounds the octets copied in either direction. The transport limit applies on top.
#[derive(Debug, Clone, Copy)]
pub enum StrValue {
    Const { value: &'static str, max_size: u16 },
    /// The getter fills the buffer and returns the number of octets written
    Get {
        max_size: u16,
        get: fn(&mut [u8]) -> u16,
    },
    Set { max_size: u16, set: fn(&[u8]) },
}

impl StrValue {
    /// Constant string bounded by the largest message payload only
    pub const fn constant(value: &'static str) -> Self {
        StrValue::Const {
            value,
            max_size: MAX_DATA_SIZE as u16,
        }
    }
}

/// Value type tag together with its source
#[derive(Debug, Clone, Copy)]
pub enum Service {
    U8(Value<u8>),
    I8(Value<i8>),
    U16(Value<u16>),
    I16(Value<i16>),
    U32(Value<u32>),
    I32(Value<i32>),
    Str(StrValue),
    Reset(fn(ResetType)),
}

/// Dispatch table entry
///
/// `attribute` is compared against command extension 0. It is ignored for `Reset`.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub object: ObjectNumber,
    pub instance: u16,
    pub command: Command,
    pub attribute: u8,
    pub service: Service,
}

impl Entry {
    pub const fn get(object: ObjectNumber, instance: u16, attribute: u8, service: Service) -> Self {
        Self {
            object,
            instance,
            command: Command::GET_ATTR,
            attribute,
            service,
        }
    }

    pub const fn set(object: ObjectNumber, instance: u16, attribute: u8, service: Service) -> Self {
        Self {
            object,
            instance,
            command: Command::SET_ATTR,
            attribute,
            service,
        }
    }

    pub const fn reset(object: ObjectNumber, instance: u16, reset: fn(ResetType)) -> Self {
        Self {
            object,
            instance,
            command: Command::RESET,
            attribute: 0,
            service: Service::Reset(reset),
        }
    }

    fn matches(&self, msg: &Message) -> bool {
        self.object == msg.dest_obj()
            && self.instance == msg.instance()
            && self.command == msg.command()
            && (self.command == Command::RESET || self.attribute == msg.cmd_ext0())
    }
}

/// Response path of the dispatch engine
pub trait Responder<'a> {
    /// Largest payload the transport can carry
    fn max_message_size(&self) -> usize;

    /// Sends a response. Failures are reported to the error log by the sender.
    fn send_response(&self, msg: MessageBuffer<'a>);

    fn report(&self, severity: Severity, code: ErrorCode, add_info: u32);
}

/// Bespoke command processor of a host object
pub trait HostObject<'a> {
    fn object(&self) -> ObjectNumber;

    /// Takes the command. The processor must eventually answer it through `responder`.
    fn process(&self, msg: MessageBuffer<'a>, responder: &dyn Responder<'a>);
}

/// Hook run before table lookup. Returns the message if it was not consumed.
pub type CatchHook<'a> =
    fn(MessageBuffer<'a>, &dyn Responder<'a>) -> Option<MessageBuffer<'a>>;

enum Outcome {
    Respond(u16),
    Error(ResponseError),
    Mismatch,
}

/// Routes incoming commands to table entries and host objects
pub struct CommandHandler<'a> {
    table: &'a [Entry],
    objects: &'a [&'a (dyn HostObject<'a> + Sync)],
    catch: Option<CatchHook<'a>>,
}

impl<'a> CommandHandler<'a> {
    pub const fn new(table: &'a [Entry], objects: &'a [&'a (dyn HostObject<'a> + Sync)]) -> Self {
        Self {
            table,
            objects,
            catch: None,
        }
    }

    pub const fn with_catch(self, catch: CatchHook<'a>) -> Self {
        Self {
            catch: Some(catch),
            ..self
        }
    }

    /// First table entry answering the command
    pub fn find(&self, msg: &Message) -> Option<&'a Entry> {
        if msg.dest_obj() == ObjectNumber::APPD {
            return None;
        }
        self.table.iter().find(|entry| entry.matches(msg))
    }

    /// Answers a received command
    pub fn handle(&self, msg: MessageBuffer<'a>, responder: &dyn Responder<'a>) {
        let msg = match self.catch {
            Some(catch) => match catch(msg, responder) {
                Some(msg) => msg,
                None => return,
            },
            None => msg,
        };

        if let Some(entry) = self.find(&msg) {
            execute(entry, msg, responder);
            return;
        }

        let object = msg.dest_obj();
        if let Some(host) = self.objects.iter().find(|host| host.object() == object) {
            host.process(msg, responder);
            return;
        }

        debug!("command for unsupported object {:?}", object);
        let mut msg = msg;
        msg.set_error_response(ResponseError::UNSUP_OBJ);
        responder.send_response(msg);
    }
}

fn execute<'a>(entry: &Entry, mut msg: MessageBuffer<'a>, responder: &dyn Responder<'a>) {
    let command = msg.command();
    let max_message_size = responder.max_message_size();
    let outcome = match &entry.service {
        Service::U8(value) => scalar(value, command, &mut msg),
        Service::I8(value) => scalar(value, command, &mut msg),
        Service::U16(value) => scalar(value, command, &mut msg),
        Service::I16(value) => scalar(value, command, &mut msg),
        Service::U32(value) => scalar(value, command, &mut msg),
        Service::I32(value) => scalar(value, command, &mut msg),
        Service::Str(value) => string(value, command, &mut msg, max_message_size),
        Service::Reset(reset) if command == Command::RESET => {
            reset(ResetType::from(msg.cmd_ext1()));
            Outcome::Respond(0)
        }
        Service::Reset(_) => Outcome::Mismatch,
    };

    let mismatch = matches!(outcome, Outcome::Mismatch);
    match outcome {
        Outcome::Respond(size) => msg.set_response(size),
        Outcome::Error(error) => msg.set_error_response(error),
        Outcome::Mismatch => msg.set_error_response(ResponseError::GENERAL_ERROR),
    }
    responder.send_response(msg);

    // The peer gets its answer before the fatal report stops the driver
    if mismatch {
        responder.report(
            Severity::Fatal,
            ErrorCode::UnsupportedDataType,
            entry.attribute.into(),
        );
    }
}

fn scalar<T: Scalar>(value: &Value<T>, command: Command, msg: &mut Message) -> Outcome {
    match (value, command) {
        (Value::Const(value), Command::GET_ATTR) => write_scalar(*value, msg),
        (Value::Get(get), Command::GET_ATTR) => write_scalar(get(), msg),
        (Value::Set(set), Command::SET_ATTR) => {
            let size = usize::from(msg.data_size());
            if size < T::SIZE {
                return Outcome::Error(ResponseError::NOT_ENOUGH_DATA);
            }
            if size > T::SIZE {
                return Outcome::Error(ResponseError::TOO_MUCH_DATA);
            }
            set(unwrap!(msg.get::<T>(0)));
            Outcome::Respond(0)
        }
        _ => Outcome::Mismatch,
    }
}

fn write_scalar<T: Scalar>(value: T, msg: &mut Message) -> Outcome {
    unwrap!(msg.set(0, value));
    Outcome::Respond(T::SIZE as u16)
}

fn string(value: &StrValue, command: Command, msg: &mut Message, transport_max: usize) -> Outcome {
    let bound = |max_size: u16| usize::from(max_size).min(transport_max).min(MAX_DATA_SIZE);

    match (value, command) {
        (StrValue::Const { value, max_size }, Command::GET_ATTR) => {
            let bytes = value.as_bytes();
            let len = bytes.len().min(bound(*max_size));
            unwrap!(msg.set_string(0, &bytes[..len]));
            Outcome::Respond(len as u16)
        }
        (StrValue::Get { max_size, get }, Command::GET_ATTR) => {
            let limit = bound(*max_size);
            let written = usize::from(get(&mut msg.payload_mut()[..limit]));
            Outcome::Respond(written.min(limit) as u16)
        }
        (StrValue::Set { max_size, set }, Command::SET_ATTR) => {
            let data = msg.data();
            let len = data.len().min(bound(*max_size));
            set(&data[..len]);
            Outcome::Respond(0)
        }
        _ => Outcome::Mismatch,
    }
}
