//! Inbound remote commands.
//!
//! Commands arrive as comma-separated ASCII on the `<serial>-C` topic:
//!
//! ```text
//!   r,<register>           read one register (hex address)
//!   w,<register>,<value>   write one register
//!   p                      identity + full parameter dump
//!   ip                     PPP interface configuration
//!   restart                controlled device restart
//! ```

use crate::error::CommandError;
use crate::registers::parse_register;

/// Reply for command text that matches nothing above.
pub const NOT_RECOGNIZED: &str = "Command Not Recognized!";

/// Reply when a recognized command could not be carried out.
pub const DISPATCH_ERROR: &str = "Error processing the command!";

/// Commands the broker can send to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    Read { register: u16 },
    Write { register: u16, value: u16 },
    Dump,
    LinkInfo,
    Restart,
    Unknown,
}

impl RemoteCommand {
    /// Parse a raw payload.
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let text = core::str::from_utf8(payload).map_err(|_| CommandError::Empty)?;
        let mut fields = text.trim().split(',').map(str::trim);

        let command = match fields.next().unwrap_or_default() {
            "r" => Self::Read {
                register: register_arg(fields.next())?,
            },
            "w" => Self::Write {
                register: register_arg(fields.next())?,
                value: value_arg(fields.next())?,
            },
            "p" => Self::Dump,
            "ip" => Self::LinkInfo,
            "restart" => Self::Restart,
            _ => Self::Unknown,
        };
        Ok(command)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Dump => "dump",
            Self::LinkInfo => "ip",
            Self::Restart => "restart",
            Self::Unknown => "unknown",
        }
    }
}

fn register_arg(field: Option<&str>) -> Result<u16, CommandError> {
    let field = field.filter(|f| !f.is_empty()).ok_or(CommandError::MissingArgument)?;
    parse_register(field).ok_or(CommandError::BadRegister)
}

/// Register values are 16-bit; negative set points are sent in two's complement.
fn value_arg(field: Option<&str>) -> Result<u16, CommandError> {
    let field = field.filter(|f| !f.is_empty()).ok_or(CommandError::MissingArgument)?;
    let value: i32 = field.parse().map_err(|_| CommandError::BadValue)?;
    match value {
        0..=0xFFFF => Ok(value as u16),
        -0x8000..0 => Ok(value as i16 as u16),
        _ => Err(CommandError::BadValue),
    }
}
