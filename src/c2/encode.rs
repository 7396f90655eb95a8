/// C2 transaction frames as MPSSE command sequences.
///
/// Every frame has the same layout:
/// - START: a zero-length clock pulse
/// - drive C2D
/// - INS (+ LENGTH for data transfers), LSB first
/// - ADDRESS/DATA: written in the same drive phase, or read after releasing C2D
/// - release C2D; data transfers clock until the target pulls C2D high (WAIT)
/// - STOP: a zero-length clock pulse
///
/// The zero-length pulses have no effect on the target, they only delimit
/// frames on a logic analyzer and give a legal electrical START/STOP.

use crate::mpsse::LowBits;
use crate::mpsse::opcodes::*;

pub const CK_BIT: u8 = 0x01; // AD0 - C2CK
pub const D_O_BIT: u8 = 0x02; // AD1 - C2D output
// AD2 (C2D input) and AD5 (C2D feedback for CLK_WAIT_ON_HIGH) stay inputs

// bit count fields are "number of bits - 1": address instructions clock the
// 2-bit INS only, data instructions add the 2-bit LENGTH field (0 = one byte)
pub const ADDRESS_INS_BIT_COUNT: u8 = 1;
pub const DATA_INS_BIT_COUNT: u8 = 3;

pub const WRITE_ADDRESS_FRAME_LEN: usize = 17;
pub const READ_ADDRESS_FRAME_LEN: usize = 16;
pub const WRITE_DATA_FRAME_LEN: usize = 18;
pub const READ_DATA_FRAME_LEN: usize = 17;

/// C2CK high, C2D driven
pub const DRIVE_C2D: LowBits = LowBits { value: CK_BIT | D_O_BIT, direction: CK_BIT | D_O_BIT };
/// C2CK high, C2D released to the target
pub const RELEASE_C2D: LowBits = LowBits { value: CK_BIT | D_O_BIT, direction: CK_BIT };

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Instruction {
	ReadData = 0,
	WriteData = 1,
	ReadAddress = 2,
	WriteAddress = 3,
}

impl Instruction {
	pub fn from_bits(bits: u8) -> Self {
		match bits & 0x3 {
			0 => Instruction::ReadData,
			1 => Instruction::WriteData,
			2 => Instruction::ReadAddress,
			3 => Instruction::WriteAddress,
			_ => unreachable!(),
		}
	}

	pub fn code(self) -> u8 {
		self as u8
	}

	pub fn is_data(self) -> bool {
		match self {
			Instruction::ReadData | Instruction::WriteData => true,
			Instruction::ReadAddress | Instruction::WriteAddress => false,
		}
	}

	pub fn is_read(self) -> bool {
		match self {
			Instruction::ReadData | Instruction::ReadAddress => true,
			Instruction::WriteData | Instruction::WriteAddress => false,
		}
	}

	/// bit count field for the WRITE_BITS command carrying INS
	pub fn bit_count(self) -> u8 {
		if self.is_data() { DATA_INS_BIT_COUNT } else { ADDRESS_INS_BIT_COUNT }
	}
}

/// One C2 bus transaction; writes carry their payload byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Transaction {
	ReadData,
	WriteData(u8),
	ReadAddress,
	WriteAddress(u8),
}

impl Transaction {
	pub fn instruction(&self) -> Instruction {
		match *self {
			Transaction::ReadData => Instruction::ReadData,
			Transaction::WriteData(_) => Instruction::WriteData,
			Transaction::ReadAddress => Instruction::ReadAddress,
			Transaction::WriteAddress(_) => Instruction::WriteAddress,
		}
	}

	pub fn payload(&self) -> Option<u8> {
		match *self {
			Transaction::WriteData(v) | Transaction::WriteAddress(v) => Some(v),
			Transaction::ReadData | Transaction::ReadAddress => None,
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		encode(*self)
	}
}

fn start(cmd: &mut Vec<u8>) {
	cmd.extend_from_slice(&[CLK_BITS_NO_DATA, 0]);
}

fn stop(cmd: &mut Vec<u8>) {
	cmd.extend_from_slice(&[CLK_BITS_NO_DATA, 0]);
}

fn instruction(cmd: &mut Vec<u8>, ins: Instruction) {
	cmd.extend_from_slice(&DRIVE_C2D.command());
	cmd.extend_from_slice(&[WRITE_BITS_PVE_LSB, ins.bit_count(), ins.code()]);
}

pub fn encode(transaction: Transaction) -> Vec<u8> {
	let ins = transaction.instruction();
	let mut cmd = Vec::with_capacity(WRITE_DATA_FRAME_LEN);

	start(&mut cmd);
	instruction(&mut cmd, ins);
	match transaction.payload() {
		Some(byte) => {
			cmd.extend_from_slice(&[WRITE_BYTES_PVE_LSB, 0, 0, byte]);
			cmd.extend_from_slice(&RELEASE_C2D.command());
			if ins.is_data() {
				cmd.push(CLK_WAIT_ON_HIGH);
			}
		},
		None => {
			cmd.extend_from_slice(&RELEASE_C2D.command());
			if ins.is_data() {
				cmd.push(CLK_WAIT_ON_HIGH);
			}
			cmd.extend_from_slice(&[READ_BYTES_PVE_LSB, 0, 0]);
		},
	}
	stop(&mut cmd);

	cmd
}

pub fn write_addr(addr: u8) -> Vec<u8> {
	encode(Transaction::WriteAddress(addr))
}

pub fn read_addr() -> Vec<u8> {
	encode(Transaction::ReadAddress)
}

pub fn write_data_byte(val: u8) -> Vec<u8> {
	encode(Transaction::WriteData(val))
}

pub fn read_data_byte() -> Vec<u8> {
	encode(Transaction::ReadData)
}
