//! Instruction disassembly over a loaded image.

use crate::arch::Architecture;
use crate::program::{read_u16_be, INSTRUCTION_WIDTH};
use crate::table::OpTable;
use crate::vm::Vm;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single disassembled instruction row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisassemblyRow {
    /// Address of the instruction.
    pub address: u16,
    /// Raw instruction word.
    pub word: u16,
    /// Instruction mnemonic, or `.word` for unknown encodings.
    pub mnemonic: String,
    /// Rendered operands, empty when the form has none.
    pub operands: String,
    /// Whether no operation matched the word.
    pub is_unknown: bool,
}

impl DisassemblyRow {
    /// Mnemonic and operands as one line.
    #[must_use]
    pub fn text(&self) -> String {
        if self.operands.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, self.operands)
        }
    }
}

/// Disassembles one word against `table`.
#[must_use]
pub fn disassemble_word<A: Architecture>(table: &OpTable<A>, address: u16, word: u16) -> DisassemblyRow {
    let Some((_, operation)) = table.lookup(word) else {
        return DisassemblyRow {
            address,
            word,
            mnemonic: ".word".to_owned(),
            operands: format!("{word:#06X}"),
            is_unknown: true,
        };
    };

    let rendered = operation.disassemble(word);
    let operands = rendered
        .strip_prefix(operation.mnemonic())
        .unwrap_or(&rendered)
        .trim()
        .to_owned();
    DisassemblyRow {
        address,
        word,
        mnemonic: operation.mnemonic().to_owned(),
        operands,
        is_unknown: false,
    }
}

/// Walks `count` instructions from `start`, stopping early at the end of
/// `memory`.
#[must_use]
pub fn disassemble_memory<A: Architecture>(
    table: &OpTable<A>,
    memory: &[u8],
    start: u16,
    count: usize,
) -> Vec<DisassemblyRow> {
    let mut rows = Vec::with_capacity(count);
    let mut address = start;
    for _ in 0..count {
        let Some(word) = read_u16_be(memory, usize::from(address)) else {
            break;
        };
        rows.push(disassemble_word(table, address, word));
        let Some(next) = address.checked_add(INSTRUCTION_WIDTH) else {
            break;
        };
        address = next;
    }
    rows
}

/// Disassembles the loaded program of `vm`.
#[must_use]
pub fn disassemble_range<A: Architecture>(vm: &Vm<A>, start: u16, count: usize) -> Vec<DisassemblyRow> {
    disassemble_memory(vm.table(), vm.memory(), start, count)
}

#[cfg(test)]
mod tests {
    use super::{disassemble_memory, disassemble_range, disassemble_word};
    use crate::chip8::Chip8;
    use crate::table::OpTable;
    use crate::vm::Vm;
    use crate::Architecture;

    fn table() -> OpTable<Chip8> {
        OpTable::new(Chip8::operations().expect("valid instruction set"))
    }

    #[test]
    fn disassemble_cls() {
        let row = disassemble_word(&table(), 0, 0x00E0);
        assert_eq!(row.mnemonic, "CLS");
        assert_eq!(row.operands, "");
        assert_eq!(row.text(), "CLS");
        assert!(!row.is_unknown);
    }

    #[test]
    fn disassemble_register_and_byte() {
        let row = disassemble_word(&table(), 0, 0x6A07);
        assert_eq!(row.text(), "LD VA, 0x07");
    }

    #[test]
    fn disassemble_draw() {
        let row = disassemble_word(&table(), 0, 0xD125);
        assert_eq!(row.text(), "DRW V1, V2, 0x5");
    }

    #[test]
    fn disassemble_unknown() {
        let row = disassemble_word(&table(), 0, 0x5001);
        assert_eq!(row.mnemonic, ".word");
        assert_eq!(row.operands, "0x5001");
        assert!(row.is_unknown);
    }

    #[test]
    fn memory_walk_stops_at_last_whole_word() {
        let rows = disassemble_memory(&table(), &[0xA2, 0x2A, 0x12, 0x00, 0xFF], 0, 8);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(), "LD I, 0x22A");
        assert_eq!(rows[1].address, 2);
        assert_eq!(rows[1].text(), "JP 0x200");
    }

    #[test]
    fn range_over_vm_reads_loaded_image() {
        let mut vm = Vm::new(Chip8::default()).expect("valid instruction set");
        assert!(disassemble_range(&vm, 0, 4).is_empty());
        vm.load_bytes(&[0x00, 0xE0, 0x00, 0xEE]).expect("rom loads");
        let rows = disassemble_range(&vm, 0, 2);
        assert_eq!(rows[0].mnemonic, "CLS");
        assert_eq!(rows[1].mnemonic, "RET");
    }
}
