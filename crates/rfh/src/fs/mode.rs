//! Open modes, read sizes and seek origins.

use std::fmt::Display;
use std::str::FromStr;

use rfh_core::{CreateDisposition, CreateOptions, CreateParams, FileAccessMask, ShareAccess};

use super::FileError;

/// How a remote file is opened.
///
/// Read and write are mutually exclusive. The stream variants address non-seekable
/// endpoints such as named pipes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write,
    ReadStream,
    WriteStream,
}

impl OpenMode {
    /// Whether the handle addresses a stream endpoint.
    pub fn is_stream(self) -> bool {
        matches!(self, Self::ReadStream | Self::WriteStream)
    }

    /// Whether the handle was opened for reading only.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadStream)
    }

    /// Parameters of the create primitive for this mode.
    pub fn create_params(self) -> CreateParams {
        let create_options =
            CreateOptions::FILE_NON_DIRECTORY_FILE | CreateOptions::FILE_SYNCHRONOUS_IO_NONALERT;

        match self.is_read() {
            true => CreateParams {
                desired_access: FileAccessMask::FILE_READ_DATA
                    | FileAccessMask::FILE_READ_ATTRIBUTES,
                share_access: ShareAccess::FILE_SHARE_READ,
                create_options,
                create_disposition: CreateDisposition::Open,
                file_attributes: Default::default(),
            },
            false => CreateParams {
                desired_access: FileAccessMask::GENERIC_READ | FileAccessMask::GENERIC_WRITE,
                share_access: ShareAccess::FILE_SHARE_READ | ShareAccess::FILE_SHARE_WRITE,
                create_options,
                create_disposition: CreateDisposition::OpenIf,
                file_attributes: Default::default(),
            },
        }
    }
}

/// Parses `r`, `w`, `rp` and `wp` style mode strings.
///
/// `p` marks a stream (pipe) endpoint. Asking for both `r` and `w` is a
/// configuration error.
impl FromStr for OpenMode {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().any(|c| !matches!(c, 'r' | 'w' | 'p')) {
            return Err(FileError::UnsupportedMode(s.to_owned()));
        }

        let stream = s.contains('p');

        match (s.contains('r'), s.contains('w')) {
            (true, true) => Err(FileError::Configuration(format!(
                "mode {:?} must have exactly one of read/write",
                s
            ))),
            (true, false) if stream => Ok(Self::ReadStream),
            (true, false) => Ok(Self::Read),
            (false, true) if stream => Ok(Self::WriteStream),
            (false, true) => Ok(Self::Write),
            (false, false) => Err(FileError::UnsupportedMode(s.to_owned())),
        }
    }
}

impl Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::ReadStream => "rp",
            Self::WriteStream => "wp",
        };

        write!(f, "{}", s)
    }
}

/// How many bytes a read asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadSize {
    /// Everything from the current position to the end of the file.
    Rest,

    /// Up to this many bytes.
    Bytes(usize),
}

impl From<usize> for ReadSize {
    fn from(n: usize) -> Self {
        Self::Bytes(n)
    }
}

/// Origin of a seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the start of the file.
    Start,
    /// Relative to the current position.
    Current,
    /// Relative to the end of the file.
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert_eq!("rp".parse::<OpenMode>().unwrap(), OpenMode::ReadStream);
        assert_eq!("pw".parse::<OpenMode>().unwrap(), OpenMode::WriteStream);

        assert!(matches!(
            "rw".parse::<OpenMode>(),
            Err(FileError::Configuration(_))
        ));
        assert!(matches!(
            "wrp".parse::<OpenMode>(),
            Err(FileError::Configuration(_))
        ));
        assert!(matches!(
            "a".parse::<OpenMode>(),
            Err(FileError::UnsupportedMode(_))
        ));
        assert!(matches!(
            "".parse::<OpenMode>(),
            Err(FileError::UnsupportedMode(_))
        ));
        assert!(matches!(
            "p".parse::<OpenMode>(),
            Err(FileError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_display_parses_back() {
        for mode in [
            OpenMode::Read,
            OpenMode::Write,
            OpenMode::ReadStream,
            OpenMode::WriteStream,
        ] {
            assert_eq!(mode.to_string().parse::<OpenMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_create_params() {
        let read = OpenMode::Read.create_params();
        assert_eq!(read.create_disposition, CreateDisposition::Open);
        assert!(read.desired_access.allows_read());
        assert!(!read.desired_access.allows_write());
        assert_eq!(read.share_access, ShareAccess::FILE_SHARE_READ);

        let write = OpenMode::WriteStream.create_params();
        assert_eq!(write.create_disposition, CreateDisposition::OpenIf);
        assert!(write.desired_access.allows_write());
        assert!(write
            .create_options
            .contains(CreateOptions::FILE_NON_DIRECTORY_FILE));
    }
}
