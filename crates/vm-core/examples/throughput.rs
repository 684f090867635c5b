//! Throughput harness for the step loop.
//!
//! Runs tight CHIP-8 loops under three engine configurations and reports
//! steps per second, so the decode cache and the compiled fast path can be
//! compared against the plain interpreter.
//!
//! ## Usage
//!
//! ```sh
//! cargo run -p vm-core --release --example throughput
//! ```

#![allow(clippy::pedantic)]

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use vm_core::chip8::Chip8;
use vm_core::{Vm, VmConfig};

const NUM_THREADS: usize = 4;
const FRAME_HZ: u32 = 60;

/// `LD V0, 1; ADD V1, 1; ADD V2, V1; SNE V3, 0; LD I, 0x300; JP 0`
const ALU_LOOP: [u8; 12] = [
    0x60, 0x01, 0x71, 0x01, 0x82, 0x14, 0x43, 0x00, 0xA3, 0x00, 0x10, 0x00,
];

/// `LD I, 0x300; LD [I], V3; LD V3, [I]; DRW V0, V1, 5; JP 0`
const MEMORY_LOOP: [u8; 10] = [0xA3, 0x00, 0xF3, 0x55, 0xF3, 0x65, 0xD0, 0x15, 0x10, 0x00];

#[derive(Debug, Clone, Copy)]
struct BenchmarkResult {
    program: &'static str,
    config: &'static str,
    steps_per_second: f64,
}

fn benchmark(
    program: &'static str,
    rom: &'static [u8],
    config_name: &'static str,
    config: VmConfig,
    duration: Duration,
) -> BenchmarkResult {
    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let tx = tx.clone();
            thread::spawn(move || {
                let Ok(mut vm) = Vm::with_config(Chip8::default(), config) else {
                    return;
                };
                if vm.load_bytes(rom).is_err() {
                    return;
                }

                let mut total_steps = 0u64;
                let start = Instant::now();
                while start.elapsed() < duration {
                    match vm.run_frame(FRAME_HZ) {
                        Ok(outcome) => total_steps += u64::from(outcome.steps),
                        Err(_) => vm.reset(),
                    }
                    let _ = vm.drain_events();
                }

                tx.send(total_steps).ok();
            })
        })
        .collect();

    for h in handles {
        h.join().ok();
    }

    drop(tx);

    let total_steps: u64 = rx.iter().sum();
    BenchmarkResult {
        program,
        config: config_name,
        steps_per_second: total_steps as f64 / duration.as_secs_f64(),
    }
}

fn main() {
    let duration = Duration::from_secs(2);
    let configs = [
        ("compiled", VmConfig::default()),
        (
            "cached",
            VmConfig {
                compiled_operations: false,
                ..VmConfig::default()
            },
        ),
        ("interpreted", VmConfig::interpreted()),
    ];
    let programs: [(&'static str, &'static [u8]); 2] =
        [("alu_loop", &ALU_LOOP), ("memory_loop", &MEMORY_LOOP)];

    println!("vm-core throughput ({NUM_THREADS} threads, {duration:?} per run)");
    println!("{:<12} {:<12} {:>16}", "program", "config", "steps/s");
    for (program, rom) in programs {
        for (name, config) in configs {
            let result = benchmark(program, rom, name, config, duration);
            println!(
                "{:<12} {:<12} {:>16.0}",
                result.program, result.config, result.steps_per_second
            );
        }
    }
}
