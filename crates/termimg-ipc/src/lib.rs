//! termimg control protocol
//!
//! Shared message types for communication between `termimg-client` and the
//! `termimg` overlay daemon. One command per datagram, fields separated by
//! newlines, no replies.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Well-known path of the control endpoint
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/termimg";

/// Environment variable overriding the control endpoint path
pub const SOCKET_ENV: &str = "TERMIMG_SOCKET";

/// Largest datagram the daemon reads; anything longer is truncated
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Socket path for the control endpoint
pub fn socket_path() -> PathBuf {
    socket_path_or(DEFAULT_SOCKET_PATH)
}

/// `$TERMIMG_SOCKET` if set and non-empty, otherwise `fallback`
pub fn socket_path_or(fallback: impl AsRef<Path>) -> PathBuf {
    socket_path_from(std::env::var_os(SOCKET_ENV).as_deref(), fallback.as_ref())
}

fn socket_path_from(env_value: Option<&OsStr>, fallback: &Path) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => fallback.to_path_buf(),
    }
}

// ============================================================================
// Client → Daemon Commands
// ============================================================================

/// A single request to the overlay daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Show an image over the terminal
    Display(DisplayRequest),

    /// Hide the overlay and release its pixmap
    Clear,

    /// Stop the daemon
    Quit,
}

/// Placement of an image, in terminal cells
///
/// On the wire the numbers are horizontal first: column, row, then the
/// column and row bounds. A bound of zero leaves that dimension unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRequest {
    pub col: u32,
    pub row: u32,
    pub max_cols: u32,
    pub max_rows: u32,
    pub path: PathBuf,
}

/// Reasons a datagram is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty message")]
    Empty,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field {field} is not a non-negative integer: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

const DISPLAY_FIELDS: usize = 6;
const NUMERIC_FIELDS: [&str; 4] = ["col", "row", "max_cols", "max_rows"];

impl ControlMessage {
    /// Parse one datagram body
    ///
    /// Trailing NUL bytes are ignored so C clients sending `sizeof(buf)`
    /// bytes are understood. The path of a `display` command is everything
    /// after the fifth newline.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let bytes = &bytes[..end];
        if bytes.is_empty() {
            return Err(ParseError::Empty);
        }

        let fields: Vec<&[u8]> = bytes.splitn(DISPLAY_FIELDS, |&b| b == b'\n').collect();
        match fields[0] {
            b"clear" if fields.len() == 1 => Ok(Self::Clear),
            b"quit" if fields.len() == 1 => Ok(Self::Quit),
            b"clear" | b"quit" => Err(ParseError::FieldCount {
                expected: 1,
                found: fields.len(),
            }),
            b"display" => {
                if fields.len() != DISPLAY_FIELDS {
                    return Err(ParseError::FieldCount {
                        expected: DISPLAY_FIELDS,
                        found: fields.len(),
                    });
                }

                let mut numbers = [0u32; 4];
                for (slot, (name, raw)) in numbers
                    .iter_mut()
                    .zip(NUMERIC_FIELDS.iter().zip(&fields[1..5]))
                {
                    *slot = parse_number(name, raw)?;
                }
                let [col, row, max_cols, max_rows] = numbers;

                Ok(Self::Display(DisplayRequest {
                    col,
                    row,
                    max_cols,
                    max_rows,
                    path: PathBuf::from(OsStr::from_bytes(fields[5])),
                }))
            }
            other => Err(ParseError::UnknownCommand(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// Encode as a datagram body
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Clear => b"clear".to_vec(),
            Self::Quit => b"quit".to_vec(),
            Self::Display(request) => {
                let mut buf = format!(
                    "display\n{}\n{}\n{}\n{}\n",
                    request.col, request.row, request.max_cols, request.max_rows
                )
                .into_bytes();
                buf.extend_from_slice(request.path.as_os_str().as_bytes());
                buf
            }
        }
    }
}

impl DisplayRequest {
    pub fn new(col: u32, row: u32, max_cols: u32, max_rows: u32, path: impl AsRef<Path>) -> Self {
        Self {
            col,
            row,
            max_cols,
            max_rows,
            path: path.as_ref().to_path_buf(),
        }
    }
}

fn parse_number(field: &'static str, raw: &[u8]) -> Result<u32, ParseError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse::<u32>().ok())
        .ok_or_else(|| ParseError::InvalidNumber {
            field,
            value: String::from_utf8_lossy(raw).into_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(ControlMessage::parse(b"clear").unwrap(), ControlMessage::Clear);
        assert_eq!(ControlMessage::parse(b"quit").unwrap(), ControlMessage::Quit);
    }

    #[test]
    fn test_parse_display() {
        let msg = ControlMessage::parse(b"display\n0\n0\n80\n40\n/tmp/img.png").unwrap();
        match msg {
            ControlMessage::Display(request) => {
                assert_eq!(request.col, 0);
                assert_eq!(request.row, 0);
                assert_eq!(request.max_cols, 80);
                assert_eq!(request.max_rows, 40);
                assert_eq!(request.path, PathBuf::from("/tmp/img.png"));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_commands_match_exactly() {
        assert_eq!(
            ControlMessage::parse(b"Clear"),
            Err(ParseError::UnknownCommand("Clear".into()))
        );
        assert_eq!(
            ControlMessage::parse(b"clear\n"),
            Err(ParseError::FieldCount { expected: 1, found: 2 })
        );
        assert_eq!(
            ControlMessage::parse(b"quit now"),
            Err(ParseError::UnknownCommand("quit now".into()))
        );
    }

    #[test]
    fn test_display_field_count() {
        assert_eq!(
            ControlMessage::parse(b"display\n1\n2"),
            Err(ParseError::FieldCount { expected: 6, found: 3 })
        );
        assert_eq!(
            ControlMessage::parse(b"display"),
            Err(ParseError::FieldCount { expected: 6, found: 1 })
        );
    }

    #[test]
    fn test_display_rejects_bad_numbers() {
        assert_eq!(
            ControlMessage::parse(b"display\n0\nx\n1\n1\n/a.png"),
            Err(ParseError::InvalidNumber { field: "row", value: "x".into() })
        );
        assert_eq!(
            ControlMessage::parse(b"display\n0\n0\n-1\n1\n/a.png"),
            Err(ParseError::InvalidNumber { field: "max_cols", value: "-1".into() })
        );
        assert!(ControlMessage::parse(b"display\n\n0\n1\n1\n/a.png").is_err());
    }

    #[test]
    fn test_path_keeps_remaining_bytes() {
        let msg = ControlMessage::parse(b"display\n1\n2\n3\n4\n/tmp/a\nb c.png").unwrap();
        match msg {
            ControlMessage::Display(request) => {
                assert_eq!(request.path, PathBuf::from("/tmp/a\nb c.png"));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_trailing_nul_ignored() {
        assert_eq!(ControlMessage::parse(b"quit\0").unwrap(), ControlMessage::Quit);
        assert_eq!(ControlMessage::parse(b"\0\0"), Err(ParseError::Empty));
        assert_eq!(ControlMessage::parse(b""), Err(ParseError::Empty));
    }

    #[test]
    fn test_encode_is_parseable() {
        let msg = ControlMessage::Display(DisplayRequest::new(3, 4, 0, 20, "/home/me/cat.jpg"));
        let encoded = msg.encode();
        assert_eq!(encoded, b"display\n3\n4\n0\n20\n/home/me/cat.jpg".to_vec());
        assert_eq!(ControlMessage::parse(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_socket_path_override() {
        let fallback = Path::new(DEFAULT_SOCKET_PATH);
        assert_eq!(socket_path_from(None, fallback), PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(
            socket_path_from(Some(OsStr::new("")), fallback),
            PathBuf::from(DEFAULT_SOCKET_PATH)
        );
        assert_eq!(
            socket_path_from(Some(OsStr::new("/run/user/1000/termimg")), fallback),
            PathBuf::from("/run/user/1000/termimg")
        );
        assert_eq!(
            socket_path_from(None, Path::new("/run/termimg.sock")),
            PathBuf::from("/run/termimg.sock")
        );
    }
}
