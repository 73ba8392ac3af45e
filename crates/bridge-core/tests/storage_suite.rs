//! Block storage persistence: disks write through to their file, ramdisks
//! never touch it.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use bridge_core::{
    split_block_response, BlobMemory, BlockRequest, BlockStatus, Command, ControlWord, Device,
    DiskDevice, MemoryInterface, RamDiskDevice, BLOCK_READ, BLOCK_WRITE, REQUEST_BYTES,
};
use log as _;
use proptest::prelude::*;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const REQUEST_ADDR: u64 = 0x0;
const BUFFER_ADDR: u64 = 0x100;

fn checksum(path: &Path) -> u64 {
    let mut hasher = DefaultHasher::new();
    std::fs::read(path).unwrap().hash(&mut hasher);
    hasher.finish()
}

fn image(len: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let bytes: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    file
}

fn submit(
    device: &mut dyn Device,
    memory: &mut BlobMemory<Vec<u8>>,
    cmd: u8,
    request: BlockRequest,
) -> Option<BlockStatus> {
    memory.write(REQUEST_ADDR, &request.to_bytes()).unwrap();
    let slot = Rc::new(Cell::new(None));
    let sink = Rc::clone(&slot);
    device.handle_command(
        Command::new(ControlWord::encode(2, cmd, REQUEST_ADDR), move |response| {
            sink.set(Some(response));
        }),
        memory,
    );
    let (status, tag) = split_block_response(ControlWord::new(slot.get()?).payload());
    assert_eq!(tag, request.tag & 0xFF_FFFF_FFFF);
    status
}

fn scratch() -> BlobMemory<Vec<u8>> {
    BlobMemory::new(vec![0; 0x1000], 0)
}

#[test]
fn ramdisk_writes_leave_backing_file_unchanged() {
    let file = image(8192);
    let before = checksum(file.path());
    let mut ramdisk = RamDiskDevice::load(file.path()).unwrap();
    let mut memory = scratch();
    memory.write(BUFFER_ADDR, &[0xC3; 512]).unwrap();

    for (tag, offset) in [0_u64, 512, 4096, 7680].into_iter().enumerate() {
        let request = BlockRequest {
            addr: BUFFER_ADDR,
            offset,
            size: 512,
            tag: tag as u64,
        };
        assert_eq!(
            submit(&mut ramdisk, &mut memory, BLOCK_WRITE, request),
            Some(BlockStatus::Ok)
        );
    }

    assert_eq!(checksum(file.path()), before);
    assert!(ramdisk.store().as_bytes()[4096..4608]
        .iter()
        .all(|byte| *byte == 0xC3));
}

#[test]
fn disk_writes_reach_backing_file() {
    let file = image(4096);
    let before = checksum(file.path());
    let mut disk = DiskDevice::open(file.path()).unwrap();
    let mut memory = scratch();
    memory.write(BUFFER_ADDR, b"persisted").unwrap();

    let request = BlockRequest {
        addr: BUFFER_ADDR,
        offset: 1000,
        size: 9,
        tag: 77,
    };
    assert_eq!(
        submit(&mut disk, &mut memory, BLOCK_WRITE, request),
        Some(BlockStatus::Ok)
    );
    drop(disk);

    assert_ne!(checksum(file.path()), before);
    let contents = std::fs::read(file.path()).unwrap();
    assert_eq!(&contents[1000..1009], b"persisted");
    assert_eq!(contents.len(), 4096);
}

#[test]
fn disk_and_ramdisk_read_identical_bytes() {
    let file = image(2048);
    let mut disk = DiskDevice::open(file.path()).unwrap();
    let mut ramdisk = RamDiskDevice::load(file.path()).unwrap();
    let request = BlockRequest {
        addr: BUFFER_ADDR,
        offset: 300,
        size: 700,
        tag: 1,
    };

    let mut from_disk = scratch();
    let mut from_ram = scratch();
    assert_eq!(
        submit(&mut disk, &mut from_disk, BLOCK_READ, request),
        Some(BlockStatus::Ok)
    );
    assert_eq!(
        submit(&mut ramdisk, &mut from_ram, BLOCK_READ, request),
        Some(BlockStatus::Ok)
    );

    assert_eq!(from_disk.as_bytes(), from_ram.as_bytes());
    let expected: Vec<u8> = (300..1000).map(|i| (i % 253) as u8).collect();
    let start = BUFFER_ADDR as usize;
    assert_eq!(&from_disk.as_bytes()[start..start + 700], expected.as_slice());
}

#[test]
fn request_record_occupies_four_words() {
    assert_eq!(REQUEST_BYTES, 4 * std::mem::size_of::<u64>());
}

proptest! {
    #[test]
    fn reads_past_the_store_touch_neither_memory_nor_store(
        offset in 0_u64..4096,
        size in 1_u64..4096,
    ) {
        let file = image(1024);
        let mut ramdisk = RamDiskDevice::load(file.path()).unwrap();
        let original = ramdisk.store().clone();
        let mut memory = scratch();
        let request = BlockRequest { addr: BUFFER_ADDR, offset, size, tag: 3 };

        let status = submit(&mut ramdisk, &mut memory, BLOCK_READ, request);

        if offset + size > 1024 {
            prop_assert_eq!(status, Some(BlockStatus::OutOfRange));
            prop_assert!(memory.as_bytes()[REQUEST_BYTES..].iter().all(|byte| *byte == 0));
        } else {
            prop_assert_eq!(status, Some(BlockStatus::Ok));
        }
        prop_assert_eq!(ramdisk.store(), &original);
    }
}
