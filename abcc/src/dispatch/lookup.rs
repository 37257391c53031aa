//! Ready-made dispatch entries for common host object attributes
//!
//! ```
//! use abcc::core::ResetType;
//! use abcc::dispatch::{Entry, Value, lookup};
//!
//! fn reset(_reset_type: ResetType) {}
//!
//! static TABLE: [Entry; 4] = [
//!     lookup::application::serial_number(Value::Const(0x0001_0203)),
//!     lookup::application::vendor_name("Example Inc."),
//!     lookup::application::reset(reset),
//!     lookup::ethernet_ip::vendor_id(Value::Const(0x005A)),
//! ];
//! ```

use crate::core::{ObjectNumber, object_attr};
use crate::dispatch::{Entry, Service, StrValue, Value};

/// Object attributes (instance 0) answered from constants
pub const fn object_attributes(
    object: ObjectNumber,
    name: &'static str,
    revision: u8,
    num_instances: u16,
    highest_instance: u16,
) -> [Entry; 4] {
    [
        object_name(object, name),
        object_revision(object, revision),
        Entry::get(
            object,
            0,
            object_attr::NUM_INSTANCES,
            Service::U16(Value::Const(num_instances)),
        ),
        Entry::get(
            object,
            0,
            object_attr::HIGHEST_INSTANCE,
            Service::U16(Value::Const(highest_instance)),
        ),
    ]
}

pub const fn object_name(object: ObjectNumber, name: &'static str) -> Entry {
    Entry::get(
        object,
        0,
        object_attr::NAME,
        Service::Str(StrValue::constant(name)),
    )
}

pub const fn object_revision(object: ObjectNumber, revision: u8) -> Entry {
    Entry::get(
        object,
        0,
        object_attr::REVISION,
        Service::U8(Value::Const(revision)),
    )
}

/// Application object (0xFF)
pub mod application {
    use super::*;
    use crate::core::ResetType;

    pub const SERIAL_NUMBER: u8 = 3;
    pub const FW_AVAILABLE: u8 = 5;
    pub const VENDOR_NAME: u8 = 8;
    pub const PRODUCT_NAME: u8 = 9;

    pub const VENDOR_NAME_MAX_SIZE: u16 = 64;
    pub const PRODUCT_NAME_MAX_SIZE: u16 = 64;

    const OBJECT: ObjectNumber = ObjectNumber::APP;

    pub const fn serial_number(value: Value<u32>) -> Entry {
        Entry::get(OBJECT, 1, SERIAL_NUMBER, Service::U32(value))
    }

    pub const fn vendor_name(value: &'static str) -> Entry {
        Entry::get(
            OBJECT,
            1,
            VENDOR_NAME,
            Service::Str(StrValue::Const {
                value,
                max_size: VENDOR_NAME_MAX_SIZE,
            }),
        )
    }

    pub const fn vendor_name_getter(get: fn(&mut [u8]) -> u16) -> Entry {
        Entry::get(
            OBJECT,
            1,
            VENDOR_NAME,
            Service::Str(StrValue::Get {
                max_size: VENDOR_NAME_MAX_SIZE,
                get,
            }),
        )
    }

    pub const fn product_name(value: &'static str) -> Entry {
        Entry::get(
            OBJECT,
            1,
            PRODUCT_NAME,
            Service::Str(StrValue::Const {
                value,
                max_size: PRODUCT_NAME_MAX_SIZE,
            }),
        )
    }

    pub const fn product_name_getter(get: fn(&mut [u8]) -> u16) -> Entry {
        Entry::get(
            OBJECT,
            1,
            PRODUCT_NAME,
            Service::Str(StrValue::Get {
                max_size: PRODUCT_NAME_MAX_SIZE,
                get,
            }),
        )
    }

    /// Firmware available flag, read side
    pub const fn firmware_available(get: fn() -> u8) -> Entry {
        Entry::get(OBJECT, 1, FW_AVAILABLE, Service::U8(Value::Get(get)))
    }

    /// Firmware available flag, write side
    pub const fn set_firmware_available(set: fn(u8)) -> Entry {
        Entry::set(OBJECT, 1, FW_AVAILABLE, Service::U8(Value::Set(set)))
    }

    pub const fn reset(reset: fn(ResetType)) -> Entry {
        Entry::reset(OBJECT, 0, reset)
    }
}

/// EtherNet/IP host object (0xF8)
pub mod ethernet_ip {
    use super::*;

    pub const VENDOR_ID: u8 = 1;
    pub const DEVICE_TYPE: u8 = 2;
    pub const PRODUCT_CODE: u8 = 3;

    const OBJECT: ObjectNumber = ObjectNumber::EIP;

    pub const fn vendor_id(value: Value<u16>) -> Entry {
        Entry::get(OBJECT, 1, VENDOR_ID, Service::U16(value))
    }

    pub const fn device_type(value: Value<u16>) -> Entry {
        Entry::get(OBJECT, 1, DEVICE_TYPE, Service::U16(value))
    }

    pub const fn product_code(value: Value<u16>) -> Entry {
        Entry::get(OBJECT, 1, PRODUCT_CODE, Service::U16(value))
    }
}

/// PROFINET IO host object (0xF6)
pub mod profinet {
    use super::*;

    pub const DEVICE_ID: u8 = 1;
    pub const VENDOR_ID: u8 = 2;
    pub const ORDER_ID: u8 = 8;

    pub const ORDER_ID_MAX_SIZE: u16 = 20;

    const OBJECT: ObjectNumber = ObjectNumber::PNIO;

    pub const fn device_id(value: Value<u16>) -> Entry {
        Entry::get(OBJECT, 1, DEVICE_ID, Service::U16(value))
    }

    pub const fn vendor_id(value: Value<u16>) -> Entry {
        Entry::get(OBJECT, 1, VENDOR_ID, Service::U16(value))
    }

    pub const fn order_id(value: &'static str) -> Entry {
        Entry::get(
            OBJECT,
            1,
            ORDER_ID,
            Service::Str(StrValue::Const {
                value,
                max_size: ORDER_ID_MAX_SIZE,
            }),
        )
    }

    pub const fn order_id_getter(get: fn(&mut [u8]) -> u16) -> Entry {
        Entry::get(
            OBJECT,
            1,
            ORDER_ID,
            Service::Str(StrValue::Get {
                max_size: ORDER_ID_MAX_SIZE,
                get,
            }),
        )
    }
}
