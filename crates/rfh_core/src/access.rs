//! Access, sharing and create flags sent with the create primitive.
//!
//! Values follow the SMB2 wire encoding so a transport can forward them untouched.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Rights requested on the remote object.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FileAccessMask: u32 {
        const FILE_READ_DATA = 0x0000_0001;
        const FILE_WRITE_DATA = 0x0000_0002;
        const FILE_APPEND_DATA = 0x0000_0004;
        const FILE_READ_EA = 0x0000_0008;
        const FILE_WRITE_EA = 0x0000_0010;
        const FILE_READ_ATTRIBUTES = 0x0000_0080;
        const FILE_WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;
    }
}

bitflags! {
    /// What other openers of the same object are allowed to do.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ShareAccess: u32 {
        const FILE_SHARE_READ = 0x0000_0001;
        const FILE_SHARE_WRITE = 0x0000_0002;
        const FILE_SHARE_DELETE = 0x0000_0004;
    }
}

bitflags! {
    /// Options applied when creating or opening the object.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CreateOptions: u32 {
        const FILE_DIRECTORY_FILE = 0x0000_0001;
        const FILE_WRITE_THROUGH = 0x0000_0002;
        const FILE_SEQUENTIAL_ONLY = 0x0000_0004;
        const FILE_SYNCHRONOUS_IO_ALERT = 0x0000_0010;
        const FILE_SYNCHRONOUS_IO_NONALERT = 0x0000_0020;
        const FILE_NON_DIRECTORY_FILE = 0x0000_0040;
    }
}

bitflags! {
    /// Attributes of a file, as reported by the remote or requested on creation.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const NORMAL = 0x0000_0080;
    }
}

impl FileAccessMask {
    /// Whether the mask grants reading file data.
    pub const fn allows_read(self) -> bool {
        self.intersects(
            Self::FILE_READ_DATA
                .union(Self::GENERIC_READ)
                .union(Self::GENERIC_ALL),
        )
    }

    /// Whether the mask grants writing file data.
    pub const fn allows_write(self) -> bool {
        self.intersects(
            Self::FILE_WRITE_DATA
                .union(Self::FILE_APPEND_DATA)
                .union(Self::GENERIC_WRITE)
                .union(Self::GENERIC_ALL),
        )
    }
}

/// What the remote does when the object does or does not exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateDisposition {
    /// Replace the object if it exists, create it otherwise.
    Supersede,
    /// Open an existing object, fail otherwise.
    #[default]
    Open,
    /// Create a new object, fail if it exists.
    Create,
    /// Open the object if it exists, create it otherwise.
    OpenIf,
    /// Open and truncate an existing object, fail otherwise.
    Overwrite,
    /// Open and truncate the object if it exists, create it otherwise.
    OverwriteIf,
}

impl CreateDisposition {
    /// Whether a missing object gets created.
    pub const fn creates(self) -> bool {
        matches!(
            self,
            Self::Supersede | Self::Create | Self::OpenIf | Self::OverwriteIf
        )
    }

    /// Whether an existing object is truncated to zero length.
    pub const fn truncates(self) -> bool {
        matches!(self, Self::Supersede | Self::Overwrite | Self::OverwriteIf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mask_read_write() {
        let read = FileAccessMask::FILE_READ_DATA | FileAccessMask::FILE_READ_ATTRIBUTES;
        assert!(read.allows_read());
        assert!(!read.allows_write());

        let rw = FileAccessMask::GENERIC_READ | FileAccessMask::GENERIC_WRITE;
        assert!(rw.allows_read());
        assert!(rw.allows_write());
        assert_eq!(rw.bits(), 0xC000_0000);
        assert!(!FileAccessMask::empty().allows_read());
    }

    #[test]
    fn test_flags_keep_wire_bits() {
        let options =
            CreateOptions::FILE_NON_DIRECTORY_FILE | CreateOptions::FILE_SYNCHRONOUS_IO_NONALERT;
        assert_eq!(options.bits(), 0x60);

        // unknown bits from the remote are carried, not dropped
        let attributes = FileAttributes::from_bits_retain(0x0000_2080);
        assert!(attributes.contains(FileAttributes::NORMAL));
        assert_eq!(attributes.bits(), 0x2080);

        assert_eq!(ShareAccess::default(), ShareAccess::empty());
    }

    #[test]
    fn test_disposition_semantics() {
        assert!(!CreateDisposition::Open.creates());
        assert!(CreateDisposition::OpenIf.creates());
        assert!(!CreateDisposition::OpenIf.truncates());
        assert!(CreateDisposition::OverwriteIf.truncates());
    }
}
