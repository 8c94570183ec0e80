// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Command and response opcode tables (`spec.md` §6.2).

use super::{Error, Result};

/// Root-level command opcodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RootCommand {
    GetAllDatabases = 1,
    ConnectToDatabase = 2,
    Disconnect = 3,
}

impl RootCommand {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(Self::GetAllDatabases),
            2 => Ok(Self::ConnectToDatabase),
            3 => Ok(Self::Disconnect),
            other => Err(Error::UnknownOpcode(other)),
        }
    }
}

/// Database-level command opcodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DatabaseCommand {
    SetEncodingMethod = 4,
    Read = 5,
    Write = 6,
    CancelRead = 7,
    DisconnectDatabase = 8,
}

impl DatabaseCommand {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            4 => Ok(Self::SetEncodingMethod),
            5 => Ok(Self::Read),
            6 => Ok(Self::Write),
            7 => Ok(Self::CancelRead),
            8 => Ok(Self::DisconnectDatabase),
            other => Err(Error::UnknownOpcode(other)),
        }
    }
}

/// Server response opcodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ServerResponse {
    ListOfDatabases = 20,
    ConnectedToRoot = 21,
    SuccessfullyConnectedToDatabase = 22,
    DatabaseDoesNotExist = 23,
    DatabaseKeyUnknown = 24,
    DatabaseValueUnknown = 25,
    UnknownEncodingMethod = 26,
    EncodingMethodAccepted = 27,
    SerializingPoints = 28,
    ReadComplete = 29,
    CanceledRead = 30,
    ErrorWhileReading = 31,
    UnknownOrCorruptSeekFilter = 32,
    UnknownOrCorruptMatchFilter = 33,
    UnknownOrCorruptReaderOptions = 34,
    DatabaseDisconnected = 35,
    GoodBye = 36,
    UnknownCommand = 37,
    UnknownDatabaseCommand = 38,
    UnhandledException = 39,
}

impl ServerResponse {
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Handshake response to the fixed protocol magic (`spec.md` §4.H).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum HandshakeResponse {
    KnownProtocol = 101,
    UnknownProtocol = 102,
}

/// Authentication mode selector byte (`spec.md` §4.H).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AuthMode {
    None = 1,
    Srp = 2,
    Scram = 3,
    Integrated = 4,
    Certificate = 5,
    Resume = 255,
}

impl AuthMode {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(Self::None),
            2 => Ok(Self::Srp),
            3 => Ok(Self::Scram),
            4 => Ok(Self::Integrated),
            5 => Ok(Self::Certificate),
            255 => Ok(Self::Resume),
            other => Err(Error::UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn root_command_opcodes_round_trip() {
        for (byte, expected) in [(1u8, RootCommand::GetAllDatabases), (2, RootCommand::ConnectToDatabase), (3, RootCommand::Disconnect)] {
            assert_eq!(RootCommand::from_byte(byte).expect("known opcode"), expected);
        }
        assert!(RootCommand::from_byte(99).is_err());
    }

    #[test]
    fn auth_mode_resume_uses_the_out_of_band_255_code() {
        assert_eq!(AuthMode::from_byte(255).expect("resume"), AuthMode::Resume);
    }
}
