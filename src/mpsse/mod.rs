/// Interface to a clock-synchronous serial engine speaking the FTDI MPSSE
/// command set.
///
/// The C2 controller only needs a small part of the engine: set the low byte
/// GPIO levels/direction, clock bits/bytes in and out LSB first on the rising
/// edge, clock until an input goes high, and push the reply buffer.

use std::thread;
use std::time::{
	Duration,
	Instant,
};

use crate::config::Frequency;
use crate::error::C2Result;

mod clock;
pub mod sim;
pub mod stream;

pub use self::clock::{
	ClockSetup,
	clock_setup,
};

pub use self::sim::{
	SimEvent,
	SimTarget,
	SimTargetHandle,
};

pub use self::stream::StreamMpsse;

pub mod opcodes {
	pub const WRITE_BYTES_PVE_LSB: u8 = 0x18;
	pub const WRITE_BITS_PVE_LSB: u8 = 0x1a;
	pub const READ_BYTES_PVE_LSB: u8 = 0x28;
	pub const SET_BITS_LOW: u8 = 0x80;
	pub const GET_BITS_LOW: u8 = 0x81;
	pub const LOOPBACK_END: u8 = 0x85;
	pub const TCK_DIVISOR: u8 = 0x86;
	pub const SEND_IMMEDIATE: u8 = 0x87;
	pub const DISABLE_CLK_DIV5: u8 = 0x8a;
	pub const ENABLE_CLK_DIV5: u8 = 0x8b;
	pub const ENABLE_CLK_3PHASE: u8 = 0x8c;
	pub const DISABLE_CLK_3PHASE: u8 = 0x8d;
	pub const CLK_BITS_NO_DATA: u8 = 0x8e;
	pub const CLK_WAIT_ON_HIGH: u8 = 0x94;
}

use self::opcodes::*;

/// Level and direction of the low GPIO byte (ADBUS0..7).
///
/// A set bit in `direction` makes the pin an output driving the matching bit
/// of `value`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LowBits {
	pub value: u8,
	pub direction: u8,
}

impl LowBits {
	pub fn new(value: u8, direction: u8) -> Self {
		LowBits { value, direction }
	}

	pub fn command(&self) -> [u8; 3] {
		[SET_BITS_LOW, self.value, self.direction]
	}
}

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Clock-synchronous serial engine used by the C2 controller.
///
/// Implementations own the connection; once closed every call but
/// `is_connected` and `close` must fail with `C2Error::NotConnected`.
pub trait Mpsse {
	/// what `open` connects to (device path, simulated target, ...)
	type Endpoint: ?Sized;

	fn open(endpoint: &Self::Endpoint, direction: u8, frequency: Frequency) -> C2Result<Self>
	where
		Self: Sized;

	fn is_connected(&self) -> bool;

	/// write raw MPSSE command bytes
	fn write_data(&mut self, data: &[u8]) -> C2Result<()>;

	/// read `count` reply bytes; `attempts` bounds how often the engine is
	/// polled before giving up with `C2Error::WaitTimeout`. Bytes still due
	/// from a timed-out read are dropped once they arrive, they never answer
	/// a later read.
	fn read_data_bytes(&mut self, count: usize, attempts: usize) -> C2Result<Vec<u8>>;

	fn purge_buffers(&mut self) -> C2Result<()>;

	/// `freeze` keeps the current configuration and pin levels; otherwise
	/// the pins return to their default state before disconnecting.
	/// No-op when already closed.
	fn close(&mut self, freeze: bool) -> C2Result<()>;

	/// minimal time the transport guarantees between two writes reaching
	/// the pins; a plain byte stream guarantees none
	fn latency(&self) -> Duration {
		Duration::from_secs(0)
	}

	fn set_low_bits(&mut self, bits: LowBits) -> C2Result<()> {
		self.write_data(&bits.command())
	}

	fn set_multiphase_clock(&mut self, enable: bool) -> C2Result<()> {
		let cmd = if enable { ENABLE_CLK_3PHASE } else { DISABLE_CLK_3PHASE };
		self.write_data(&[cmd])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn low_bits_command_is_value_then_direction() {
		assert_eq!(LowBits::new(0x03, 0x01).command(), [0x80, 0x03, 0x01]);
	}

	#[test]
	fn sleep_waits_at_least_duration() {
		let start = Instant::now();
		reliable_sleep(Duration::from_micros(200));
		assert!(start.elapsed() >= Duration::from_micros(200));
	}
}
