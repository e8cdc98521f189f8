// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use num_traits::PrimInt;

/// A small wrapper to format a number as a size in bytes.
#[derive(Clone, Copy)]
pub struct NumBytes<T: PrimInt>(pub T);

impl<T: PrimInt + fmt::Debug> fmt::Debug for NumBytes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == T::one() {
            write!(f, "<{:?} byte>", self.0)
        } else {
            write!(f, "<{:?} bytes>", self.0)
        }
    }
}

/// Check if a name is a Windows device name. These are reserved regardless of
/// case and of any extension that follows.
fn is_windows_device_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();

    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => match upper.as_bytes() {
            [b'C', b'O', b'M', n] | [b'L', b'P', b'T', n] => n.is_ascii_digit(),
            _ => false,
        },
    }
}

/// Check if a string can be used as-is as a file name stem on every platform.
/// Only ASCII alphanumerics, `-`, and `_` are allowed, and Windows device names
/// are rejected.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && !is_windows_device_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_bytes() {
        assert_eq!(format!("{:?}", NumBytes(1u32)), "<1 byte>");
        assert_eq!(format!("{:?}", NumBytes(108usize)), "<108 bytes>");
    }

    #[test]
    fn safe_file_names() {
        assert!(is_safe_file_name("WTMI"));
        assert!(is_safe_file_name("OBMI"));
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name("../x"));
        assert!(!is_safe_file_name("A B"));
        assert!(!is_safe_file_name("\u{0}\u{0}\u{0}\u{1}"));
        assert!(!is_safe_file_name("\u{ff}ABC"));
    }

    #[test]
    fn windows_device_names() {
        for name in ["COM1", "com9", "LPT1", "Lpt0", "CON", "nul", "AUX", "PRN"] {
            assert!(!is_safe_file_name(name), "{name}");
        }

        for name in ["COMA", "LPTX", "COM", "CONS", "COM10", "NULL"] {
            assert!(is_safe_file_name(name), "{name}");
        }
    }
}
