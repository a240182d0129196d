use std::fmt::{self, Display};

use enum_map::Enum;

/// Handle into the kernel's channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub id: u64,
}

impl Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan#{}", self.id)
    }
}

/// The fixed set of payload kinds a rendezvous can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum PortKind {
    Bool,
    Byte,
    UByte,
    Int,
    UInt,
    Double,
    Char,
    Str,
    Chan,
}

/// A single rendezvous payload. Copied by value at the moment an
/// exchange completes; never shared between processes.
#[derive(Debug, Clone, PartialEq)]
pub enum PortValue {
    Bool(bool),
    Byte(i8),
    UByte(u8),
    Int(i64),
    UInt(u64),
    Double(f64),
    Char(char),
    Str(String),
    Chan(ChannelHandle),
}

impl PortValue {
    pub fn kind(&self) -> PortKind {
        match self {
            PortValue::Bool(_) => PortKind::Bool,
            PortValue::Byte(_) => PortKind::Byte,
            PortValue::UByte(_) => PortKind::UByte,
            PortValue::Int(_) => PortKind::Int,
            PortValue::UInt(_) => PortKind::UInt,
            PortValue::Double(_) => PortKind::Double,
            PortValue::Char(_) => PortKind::Char,
            PortValue::Str(_) => PortKind::Str,
            PortValue::Chan(_) => PortKind::Chan,
        }
    }
}

impl Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortValue::Bool(v) => write!(f, "{}", v),
            PortValue::Byte(v) => write!(f, "{}", v),
            PortValue::UByte(v) => write!(f, "{}", v),
            PortValue::Int(v) => write!(f, "{}", v),
            PortValue::UInt(v) => write!(f, "{}", v),
            PortValue::Double(v) => write!(f, "{}", v),
            PortValue::Char(v) => write!(f, "{}", v),
            PortValue::Str(v) => write!(f, "{}", v),
            PortValue::Chan(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_value_kind() {
        assert_eq!(PortValue::Int(7).kind(), PortKind::Int);
        assert_eq!(PortValue::Char('x').kind(), PortKind::Char);
        assert_eq!(
            PortValue::Chan(ChannelHandle { id: 3 }).kind(),
            PortKind::Chan
        );
    }
}
