/// Decode MPSSE command streams back into C2 transactions.
///
/// Only the commands the controller and the transports emit are understood;
/// anything else is rejected as `InvalidArgument`.

use std::slice;

use crate::error::{
	C2Error,
	C2Result,
};
use crate::mpsse::LowBits;
use crate::mpsse::opcodes::*;

use super::encode::{
	DRIVE_C2D,
	Instruction,
	RELEASE_C2D,
	Transaction,
};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Command {
	SetBitsLow(LowBits),
	GetBitsLow,
	/// clock pulses without data; `bits` is the raw length field (n - 1)
	ClockBits { bits: u8 },
	/// `bits` is the raw length field (n - 1)
	WriteBits { bits: u8, data: u8 },
	WriteBytes(Vec<u8>),
	ReadBytes(usize),
	WaitOnHigh,
	SendImmediate,
	MultiphaseClock(bool),
	DivideBy5(bool),
	TckDivisor(u16),
	LoopbackEnd,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Segment {
	Frame(Transaction),
	Command(Command),
}

fn truncated(opcode: u8) -> C2Error {
	C2Error::invalid_argument(format!("truncated command 0x{:02x}", opcode))
}

fn take(it: &mut slice::Iter<u8>, opcode: u8) -> C2Result<u8> {
	it.next().cloned().ok_or_else(|| truncated(opcode))
}

fn take_len(it: &mut slice::Iter<u8>, opcode: u8) -> C2Result<usize> {
	let lo = take(it, opcode)? as usize;
	let hi = take(it, opcode)? as usize;
	Ok((lo | hi << 8) + 1)
}

pub fn parse(data: &[u8]) -> C2Result<Vec<Command>> {
	let mut it = data.iter();
	let mut commands = Vec::new();

	while let Some(&opcode) = it.next() {
		let cmd = match opcode {
			SET_BITS_LOW => {
				let value = take(&mut it, opcode)?;
				let direction = take(&mut it, opcode)?;
				Command::SetBitsLow(LowBits { value, direction })
			},
			GET_BITS_LOW => Command::GetBitsLow,
			CLK_BITS_NO_DATA => Command::ClockBits { bits: take(&mut it, opcode)? },
			WRITE_BITS_PVE_LSB => {
				let bits = take(&mut it, opcode)?;
				ensure_c2(bits < 8, || format!("bit count {} out of range", bits))?;
				Command::WriteBits { bits, data: take(&mut it, opcode)? }
			},
			WRITE_BYTES_PVE_LSB => {
				let len = take_len(&mut it, opcode)?;
				let payload = it.as_slice();
				if payload.len() < len {
					return Err(truncated(opcode));
				}
				let bytes = payload[..len].to_vec();
				it = payload[len..].iter();
				Command::WriteBytes(bytes)
			},
			READ_BYTES_PVE_LSB => Command::ReadBytes(take_len(&mut it, opcode)?),
			CLK_WAIT_ON_HIGH => Command::WaitOnHigh,
			SEND_IMMEDIATE => Command::SendImmediate,
			ENABLE_CLK_3PHASE => Command::MultiphaseClock(true),
			DISABLE_CLK_3PHASE => Command::MultiphaseClock(false),
			ENABLE_CLK_DIV5 => Command::DivideBy5(true),
			DISABLE_CLK_DIV5 => Command::DivideBy5(false),
			TCK_DIVISOR => {
				let lo = take(&mut it, opcode)? as u16;
				let hi = take(&mut it, opcode)? as u16;
				Command::TckDivisor(lo | hi << 8)
			},
			LOOPBACK_END => Command::LoopbackEnd,
			_ => return Err(C2Error::invalid_argument(format!("unsupported command 0x{:02x}", opcode))),
		};
		commands.push(cmd);
	}

	Ok(commands)
}

fn ensure_c2<F: FnOnce() -> String>(cond: bool, msg: F) -> C2Result<()> {
	if cond { Ok(()) } else { Err(C2Error::invalid_argument(msg())) }
}

fn is_pulse(cmd: &Command) -> bool {
	*cmd == Command::ClockBits { bits: 0 }
}

struct FrameReader<'a> {
	it: slice::Iter<'a, Command>,
}

impl<'a> FrameReader<'a> {
	fn next(&mut self, what: &str) -> C2Result<&'a Command> {
		self.it.next().ok_or_else(|| {
			C2Error::invalid_argument(format!("C2 frame ended before {}", what))
		})
	}

	fn require(&mut self, expected: &Command, what: &str) -> C2Result<()> {
		let cmd = self.next(what)?;
		ensure_c2(cmd == expected, || format!("expected {} ({:?}), got {:?}", what, expected, cmd))
	}

	// after START
	fn frame(&mut self) -> C2Result<Transaction> {
		self.require(&Command::SetBitsLow(DRIVE_C2D), "drive C2D")?;

		let ins = match *self.next("INS")? {
			Command::WriteBits { bits, data } => {
				let ins = Instruction::from_bits(data);
				ensure_c2(bits == ins.bit_count(), || {
					format!("{:?} sent with bit count {}, expected {}", ins, bits, ins.bit_count())
				})?;
				ins
			},
			ref other => return Err(C2Error::invalid_argument(format!("expected INS, got {:?}", other))),
		};

		let transaction = if ins.is_read() {
			self.require(&Command::SetBitsLow(RELEASE_C2D), "release C2D")?;
			if ins.is_data() {
				self.require(&Command::WaitOnHigh, "WAIT")?;
			}
			self.require(&Command::ReadBytes(1), "read byte")?;
			if ins.is_data() { Transaction::ReadData } else { Transaction::ReadAddress }
		} else {
			let byte = match *self.next("payload")? {
				Command::WriteBytes(ref bytes) if bytes.len() == 1 => bytes[0],
				ref other => return Err(C2Error::invalid_argument(format!("expected payload byte, got {:?}", other))),
			};
			self.require(&Command::SetBitsLow(RELEASE_C2D), "release C2D")?;
			if ins.is_data() {
				self.require(&Command::WaitOnHigh, "WAIT")?;
				Transaction::WriteData(byte)
			} else {
				Transaction::WriteAddress(byte)
			}
		};

		self.require(&Command::ClockBits { bits: 0 }, "STOP")?;
		Ok(transaction)
	}
}

/// Group commands into C2 frames (START .. STOP); everything between frames
/// is passed through as plain commands.
pub fn segments(commands: &[Command]) -> C2Result<Vec<Segment>> {
	let mut reader = FrameReader { it: commands.iter() };
	let mut result = Vec::new();

	while let Some(cmd) = reader.it.next() {
		if is_pulse(cmd) {
			result.push(Segment::Frame(reader.frame()?));
		} else {
			result.push(Segment::Command(cmd.clone()));
		}
	}

	Ok(result)
}

/// Decode a command stream that must consist of C2 frames only.
pub fn transactions(data: &[u8]) -> C2Result<Vec<Transaction>> {
	segments(&parse(data)?)?.into_iter().map(|segment| match segment {
		Segment::Frame(t) => Ok(t),
		Segment::Command(cmd) => Err(C2Error::invalid_argument(format!("{:?} outside of a C2 frame", cmd))),
	}).collect()
}
