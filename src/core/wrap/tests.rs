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

//! File wrapper registry tests

use super::hexdump::{hexdump, print_hexdump, DumpPrefix};
use super::*;
use crate::core::config::Options;
use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Wrapper that counts releases and echoes writes back on read
struct Recorder {
    releases: Rc<Cell<u32>>,
    data: Vec<u8>,
}

impl FileOps for Recorder {
    fn release(&mut self, _path: &str) {
        self.releases.set(self.releases.get() + 1);
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }
}

struct Inert;

impl FileOps for Inert {}

fn recording_registry(path: &str) -> (Files, Rc<Cell<u32>>) {
    let releases = Rc::new(Cell::new(0));
    let counter = releases.clone();

    let mut files = Files::new();
    files.register(path, move |_, _| {
        Ok(Box::new(Recorder {
            releases: counter.clone(),
            data: Vec::new(),
        }) as Box<dyn FileOps>)
    });

    (files, releases)
}

#[test]
fn test_open_matches_exact_path() {
    let (mut files, _) = recording_registry("/dev/nvhost-gr3d");

    assert!(files.open("/dev/nvhost-gr3d", 3).is_some());
    assert!(files.open("/dev/nvhost-gr3d0", 4).is_none());
    assert!(files.open("/dev/nvhost", 5).is_none());
    assert_eq!(files.open_files(), 1);
}

#[test]
fn test_open_uses_first_registration() {
    let first = Rc::new(RefCell::new(Vec::new()));
    let log = first.clone();

    let mut files = Files::new();
    files.register("/dev/nvmap", move |path, fd| {
        log.borrow_mut().push(format!("first {} {}", path, fd));
        Ok(Box::new(Inert) as Box<dyn FileOps>)
    });
    files.register("/dev/nvmap", |_, _| Err(io::Error::other("second entry used")));

    assert!(files.open("/dev/nvmap", 7).is_some());
    assert_eq!(files.patterns(), 2);
    assert_eq!(first.borrow().as_slice(), ["first /dev/nvmap 7"]);
}

#[test]
fn test_open_constructor_failure_leaves_registry_untouched() {
    let mut files = Files::new();
    files.register("/dev/nvmap", |_, _| Err(io::Error::other("no device")));

    assert!(files.open("/dev/nvmap", 3).is_none());
    assert_eq!(files.open_files(), 0);
    assert!(files.lookup(3).is_none());
}

#[test]
fn test_register_table() {
    fn open_inert(_: &str, _: RawFd) -> io::Result<Box<dyn FileOps>> {
        Ok(Box::new(Inert))
    }

    let mut files = Files::new();
    files.register_table(&[("/dev/nvhost-ctrl", open_inert), ("/dev/nvhost-gr3d", open_inert)]);

    assert_eq!(files.patterns(), 2);
    assert!(files.open("/dev/nvhost-ctrl", 3).is_some());
    assert!(files.open("/dev/nvhost-gr3d", 4).is_some());
    assert_eq!(files.find("/dev/nvhost-gr3d").unwrap().fd(), Some(4));
}

#[test]
fn test_lookup_by_primary_and_duplicate() {
    let (mut files, _) = recording_registry("/dev/nvmap");
    files.open("/dev/nvmap", 3).unwrap();
    files.dup(3, 10).unwrap();

    assert_eq!(files.lookup(3).unwrap().path(), "/dev/nvmap");
    assert_eq!(files.lookup(10).unwrap().path(), "/dev/nvmap");
    assert!(files.lookup(11).is_none());
    assert_eq!(files.lookup(3).unwrap().dup_fds().collect::<Vec<_>>(), vec![10]);
}

#[test]
fn test_find_returns_first_open_file() {
    let (mut files, _) = recording_registry("/dev/nvmap");
    files.open("/dev/nvmap", 3).unwrap();
    files.open("/dev/nvmap", 4).unwrap();

    assert_eq!(files.find("/dev/nvmap").unwrap().fd(), Some(3));
    assert!(files.find("/dev/nvhost-gr3d").is_none());
}

#[test]
fn test_dup_slot_exhaustion() {
    let (mut files, _) = recording_registry("/dev/nvmap");
    files.open("/dev/nvmap", 3).unwrap();

    for i in 0..MAX_DUP_FDS as RawFd {
        files.dup(3, 100 + i).unwrap();
    }

    let err = files.dup(3, 200).unwrap_err();
    assert!(matches!(
        err,
        GrateError::SlotExhaustion { capacity: MAX_DUP_FDS, .. }
    ));

    // Existing slots survive and the rejected fd is not tracked
    let file = files.lookup(3).unwrap();
    assert_eq!(file.dup_fds().count(), MAX_DUP_FDS);
    assert!(!file.matches(200));
}

#[test]
fn test_dup_unknown_fd() {
    let mut files = Files::new();
    assert!(matches!(files.dup(42, 43), Err(GrateError::UnknownFd(42))));
}

#[test]
fn test_close_primary_last_releases_once() {
    let (mut files, releases) = recording_registry("/dev/nvmap");
    files.open("/dev/nvmap", 3).unwrap();
    files.dup(3, 9).unwrap();

    assert!(files.close(9));
    assert_eq!(releases.get(), 0);
    assert!(files.lookup(3).is_some());

    assert!(files.close(3));
    assert_eq!(releases.get(), 1);
    assert_eq!(files.open_files(), 0);
}

#[test]
fn test_close_primary_first_keeps_file_alive() {
    let (mut files, releases) = recording_registry("/dev/nvmap");
    files.open("/dev/nvmap", 3).unwrap();
    files.dup(3, 9).unwrap();
    files.dup(9, 12).unwrap();

    assert!(files.close(3));
    assert!(files.lookup(3).is_none());
    assert_eq!(files.lookup(9).unwrap().fd(), None);

    assert!(files.close(12));
    assert_eq!(releases.get(), 0);

    assert!(files.close(9));
    assert_eq!(releases.get(), 1);

    // Nothing left to close
    assert!(!files.close(9));
    assert_eq!(releases.get(), 1);
}

#[test]
fn test_closed_slot_is_reused() {
    let (mut files, _) = recording_registry("/dev/nvmap");
    files.open("/dev/nvmap", 3).unwrap();

    for i in 0..MAX_DUP_FDS as RawFd {
        files.dup(3, 100 + i).unwrap();
    }
    assert!(files.close(104));
    files.dup(3, 200).unwrap();

    assert!(files.lookup(200).is_some());
}

#[test]
fn test_close_unknown_fd() {
    let mut files = Files::new();
    assert!(!files.close(3));
}

#[test]
fn test_forwarded_io() {
    let (mut files, _) = recording_registry("/dev/nvhost-gr3d");
    files.set_verbose(true);
    files.open("/dev/nvhost-gr3d", 5).unwrap();

    assert_eq!(files.write(5, b"gr3d").unwrap().unwrap(), 4);

    let mut buf = [0u8; 8];
    assert_eq!(files.read(5, &mut buf).unwrap().unwrap(), 4);
    assert_eq!(&buf[..4], b"gr3d");

    let err = files.ioctl(5, 0xC004_0001, &mut buf).unwrap().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Unsupported);

    // Not intercepted
    assert!(files.read(6, &mut buf).is_none());
    assert!(files.write(6, b"x").is_none());
    assert!(files.ioctl(6, 0, &mut buf).is_none());
}

#[test]
fn test_hexdump_offset_prefix() {
    let data: Vec<u8> = (0x41..0x41 + 20).collect();
    let dump = hexdump(DumpPrefix::Offset, "  ", &data, 16, true);
    let lines: Vec<&str> = dump.lines().collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "  00000000: 41 42 43 44 45 46 47 48 49 4a 4b 4c 4d 4e 4f 50 | ABCDEFGHIJKLMNOP"
    );
    assert_eq!(
        lines[1],
        format!("  00000010: 51 52 53 54{} | QRST", "   ".repeat(12))
    );
}

#[test]
fn test_hexdump_without_prefix_or_ascii() {
    let dump = hexdump(DumpPrefix::None, "", &[0x00, 0x7f, 0x20], 3, false);
    assert_eq!(dump, "00 7f 20 | \n");

    let dump = hexdump(DumpPrefix::None, "", &[0x00, 0x7f, 0x20], 3, true);
    assert_eq!(dump, "00 7f 20 | .. \n");
}

#[test]
fn test_hexdump_empty_buffer() {
    assert_eq!(hexdump(DumpPrefix::Offset, "", &[], 16, true), "");
}

#[test]
fn test_print_hexdump_respects_verbosity() {
    let mut out = Vec::new();
    print_hexdump(&mut out, false, DumpPrefix::Offset, "", b"abc", 16, true).unwrap();
    assert!(out.is_empty());

    print_hexdump(&mut out, true, DumpPrefix::Address, "", b"abc", 16, true).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("61 62 63"));
    assert!(text.ends_with("| abc\n"));
}

#[test]
fn test_verbosity_from_options() {
    let options = Options {
        verbose: true,
        ..Options::default()
    };

    assert!(Files::with_options(&options).is_verbose());
    assert!(!Files::with_options(&Options::default()).is_verbose());
}

/// Descriptor for close-order index `i`: 0 is the primary, the rest dups
fn close_order_fd(i: usize) -> RawFd {
    if i == 0 {
        3
    } else {
        100 + i as RawFd
    }
}

proptest! {
    #[test]
    fn prop_release_once_in_any_close_order(
        order in (0..=MAX_DUP_FDS)
            .prop_flat_map(|dups| Just((0..=dups).collect::<Vec<usize>>()).prop_shuffle())
    ) {
        let (mut files, releases) = recording_registry("/dev/nvmap");
        files.open("/dev/nvmap", close_order_fd(0)).unwrap();
        for i in 1..order.len() {
            files.dup(close_order_fd(0), close_order_fd(i)).unwrap();
        }

        for (closed, &i) in order.iter().enumerate() {
            prop_assert!(files.close(close_order_fd(i)));

            let last = closed + 1 == order.len();
            prop_assert_eq!(releases.get(), u32::from(last));
            prop_assert_eq!(files.find("/dev/nvmap").is_some(), !last);
        }

        for i in 0..order.len() {
            prop_assert!(files.lookup(close_order_fd(i)).is_none());
            prop_assert!(!files.close(close_order_fd(i)));
        }
        prop_assert!(files.find("/dev/nvmap").is_none());
        prop_assert_eq!(releases.get(), 1);
    }
}
