use crate::jvm::binary_format::{Deserialize, Serialize};
use crate::jvm::DecodeError;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file version
///
/// Serialized minor first, major second.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const JAVA8: Version = Version {
        major: 52,
        minor: 0,
    };
    pub const JAVA11: Version = Version {
        major: 55,
        minor: 0,
    };
    pub const JAVA17: Version = Version {
        major: 61,
        minor: 0,
    };
}

impl Default for Version {
    fn default() -> Version {
        Version::JAVA8
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor.serialize(writer)?;
        self.major.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, DecodeError> {
        let minor = u16::deserialize(reader)?;
        let major = u16::deserialize(reader)?;
        Ok(Version { major, minor })
    }
}
