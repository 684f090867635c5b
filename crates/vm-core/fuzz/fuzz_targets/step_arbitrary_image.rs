#![no_main]

use libfuzzer_sys::fuzz_target;
use vm_core::chip8::{Chip8, KEYDOWN};
use vm_core::{Event, Vm, VmConfig};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let config = if data[0] & 1 == 0 {
        VmConfig::default()
    } else {
        VmConfig::interpreted()
    };
    let Ok(mut vm) = Vm::with_config(Chip8::default(), config) else {
        return;
    };
    if vm.load_bytes(&data[1..]).is_err() {
        return;
    }

    for step in 0..512_u16 {
        if vm.step().is_err() {
            let _ = vm.snapshot().map(|snapshot| vm.restore(&snapshot));
            break;
        }
        if vm.is_awaiting() {
            vm.emit(Event::new(KEYDOWN, step & 0xF));
        }
    }
    let _ = vm.drain_events();
});
