// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hex dumps of intercepted buffers
//!
//! Output format, one line per `columns` bytes:
//!
//! ```text
//! <prefix><offset>: 01 02 03 ..          | ..ascii..
//! ```

use std::fmt::Write as _;
use std::io;

/// What to print in front of every line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpPrefix {
    None,
    /// Offset of the line from the start of the buffer
    Offset,
    /// Address of the line in memory
    Address,
}

/// Format `buffer` as a hex dump
///
/// Short final lines are padded so the ASCII column lines up.
///
/// # Example
///
/// ```
/// use grate::core::wrap::hexdump::{hexdump, DumpPrefix};
///
/// let dump = hexdump(DumpPrefix::Offset, "", b"AB\x00", 4, true);
/// assert_eq!(dump, "00000000: 41 42 00    | AB.\n");
/// ```
pub fn hexdump(prefix_type: DumpPrefix, prefix: &str, buffer: &[u8], columns: usize, ascii: bool) -> String {
    let columns = columns.max(1);
    let mut out = String::new();

    for (line, chunk) in buffer.chunks(columns).enumerate() {
        let start = line * columns;
        out.push_str(prefix);

        match prefix_type {
            DumpPrefix::None => {}
            DumpPrefix::Offset => {
                let _ = write!(out, "{:08x}: ", start);
            }
            DumpPrefix::Address => {
                let _ = write!(out, "{:p}: ", buffer[start..].as_ptr());
            }
        }

        for (i, byte) in chunk.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{:02x}", byte);
        }

        for _ in chunk.len()..columns {
            out.push_str("   ");
        }

        out.push_str(" | ");

        if ascii {
            out.extend(chunk.iter().map(|&b| {
                if (0x20..=0x7e).contains(&b) {
                    b as char
                } else {
                    '.'
                }
            }));
        }

        out.push('\n');
    }

    out
}

/// Write a hex dump of `buffer` to `writer` when `verbose` is set
pub fn print_hexdump<W: io::Write>(
    writer: &mut W,
    verbose: bool,
    prefix_type: DumpPrefix,
    prefix: &str,
    buffer: &[u8],
    columns: usize,
    ascii: bool,
) -> io::Result<()> {
    if !verbose {
        return Ok(());
    }

    writer.write_all(hexdump(prefix_type, prefix, buffer, columns, ascii).as_bytes())
}
