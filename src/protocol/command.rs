//! Command set for the file-sharing control connection

/// Commands understood by the file-sharing dispatcher.
///
/// The set is closed; code point 4 is reserved and unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Download a file from the server
    Get = 1,
    /// Upload a file to the server
    Put = 2,
    /// List the server's shared directory
    List = 3,
    /// End the session
    Bye = 5,
    /// Probe point reserved for discovery integration
    Scan = 6,
    /// No-op reserved for a future handshake
    Connect = 7,
}

impl Command {
    /// Decode a command byte. Unrecognized values are a protocol violation
    /// handled by the dispatcher (connection dropped with no reply).
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Command::Get),
            2 => Some(Command::Put),
            3 => Some(Command::List),
            5 => Some(Command::Bye),
            6 => Some(Command::Scan),
            7 => Some(Command::Connect),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_round_trip() {
        for cmd in [
            Command::Get,
            Command::Put,
            Command::List,
            Command::Bye,
            Command::Scan,
            Command::Connect,
        ] {
            assert_eq!(Command::from_u8(cmd.as_u8()), Some(cmd));
        }
    }

    #[test]
    fn reserved_and_unknown_bytes_rejected() {
        assert_eq!(Command::from_u8(0), None);
        assert_eq!(Command::from_u8(4), None);
        assert_eq!(Command::from_u8(8), None);
        assert_eq!(Command::from_u8(255), None);
    }
}
