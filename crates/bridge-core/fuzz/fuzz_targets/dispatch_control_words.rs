#![no_main]

use bridge_core::{
    BlobMemory, ConsoleDevice, ControlWord, DeviceRegistry, HostBridge, MemoryInterface,
    RamDiskDevice,
};
use libfuzzer_sys::fuzz_target;

const MEMORY_BASE: u64 = 0x1000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let mut registry = DeviceRegistry::new();
    let _ = registry.register(Box::new(ConsoleDevice::with_output(std::io::sink())));
    let _ = registry.register(Box::new(RamDiskDevice::from_bytes("fuzz", vec![0xA5; 512])));

    let mut memory = BlobMemory::new(vec![0; 256], MEMORY_BASE);
    let _ = memory.write(MEMORY_BASE, &data[..data.len().min(256)]);
    let mut bridge = HostBridge::new(registry, memory);

    let mut delivered = 0_usize;
    for chunk in data.chunks_exact(8) {
        let mut raw = [0; 8];
        raw.copy_from_slice(chunk);
        let word = u64::from_le_bytes(raw);
        bridge.deliver(word);
        delivered += 1;

        if word.to_le_bytes()[0] & 1 == 1 {
            bridge.tick();
            bridge.feed_input(raw[1]);
        }
    }

    while bridge.waiting_for_input() {
        bridge.feed_input(0);
    }

    let responses = bridge.take_responses();
    assert_eq!(responses.len(), delivered);
    for response in responses {
        let _ = ControlWord::new(response).payload();
    }
});
