/// Simulated MPSSE engine with a C2 target attached.
///
/// The target decodes the command stream it receives, keeps the C2 address
/// register and a 256 byte data register file, and answers reads from them.
/// Every transport call is journaled so callers can check ordering.

use std::cell::{
	Ref,
	RefCell,
	RefMut,
};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::c2::decode::{
	self,
	Command,
	Segment,
};
use crate::c2::encode::Transaction;
use crate::config::Frequency;
use crate::error::{
	C2Error,
	C2Result,
};

use super::{
	LowBits,
	Mpsse,
	clock_setup,
};

#[derive(Clone, PartialEq, Debug)]
pub enum SimEvent {
	Open { direction: u8, frequency: Frequency },
	Write(Vec<u8>),
	Read { count: usize, attempts: usize },
	Purge,
	/// pins and clocking restored to defaults by a non-freezing close
	ResetPins,
	Close { freeze: bool },
}

struct SimState {
	events: Vec<SimEvent>,
	executed: Vec<Transaction>,
	registers: [u8; 256],
	address: u8,
	pins: LowBits,
	multiphase: bool,
	replies: VecDeque<u8>,
	// reply bytes due from reads that timed out; dropped once they show up
	owed: usize,
	busy: bool,
	// segments stuck behind a data transfer whose WAIT hasn't ended
	stalled: VecDeque<Segment>,
	fail_open: bool,
	fail_writes: bool,
}

impl SimState {
	fn execute(&mut self, transaction: Transaction) {
		match transaction {
			Transaction::WriteAddress(addr) => self.address = addr,
			Transaction::ReadAddress => self.replies.push_back(self.address),
			Transaction::WriteData(val) => self.registers[self.address as usize] = val,
			Transaction::ReadData => self.replies.push_back(self.registers[self.address as usize]),
		}
		self.executed.push(transaction);
	}

	fn command(&mut self, cmd: Command) {
		match cmd {
			Command::SetBitsLow(bits) => self.pins = bits,
			Command::GetBitsLow => self.replies.push_back(self.pins.value),
			Command::MultiphaseClock(enable) => self.multiphase = enable,
			// raw reads outside a C2 frame sample an idle (pulled up) C2D
			Command::ReadBytes(count) => {
				for _ in 0..count {
					self.replies.push_back(0xff);
				}
			},
			_ => (),
		}
	}

	// the engine handles commands strictly in order: once a data transfer
	// waits on a busy target everything after it waits too
	fn run(&mut self, segment: Segment) {
		let waits = match segment {
			Segment::Frame(transaction) => self.busy && transaction.instruction().is_data(),
			Segment::Command(_) => false,
		};
		if waits || !self.stalled.is_empty() {
			self.stalled.push_back(segment);
			return;
		}
		match segment {
			Segment::Frame(transaction) => self.execute(transaction),
			Segment::Command(cmd) => self.command(cmd),
		}
	}

	fn resume(&mut self) {
		let stalled: Vec<Segment> = self.stalled.drain(..).collect();
		for segment in stalled {
			self.run(segment);
		}
	}

	fn write(&mut self, data: &[u8]) -> C2Result<()> {
		if self.fail_writes {
			return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure").into());
		}
		for segment in decode::segments(&decode::parse(data)?)? {
			self.run(segment);
		}
		Ok(())
	}

	fn drop_late_replies(&mut self) {
		let late = self.owed.min(self.replies.len());
		self.replies.drain(..late);
		self.owed -= late;
	}
}

/// Shared view on a simulated target; clones refer to the same target.
#[derive(Clone)]
pub struct SimTargetHandle(Rc<RefCell<SimState>>);

impl Default for SimTargetHandle {
	fn default() -> Self {
		Self::new()
	}
}

impl SimTargetHandle {
	pub fn new() -> Self {
		SimTargetHandle(Rc::new(RefCell::new(SimState {
			events: Vec::new(),
			executed: Vec::new(),
			registers: [0u8; 256],
			address: 0,
			pins: LowBits::new(0, 0),
			multiphase: false,
			replies: VecDeque::new(),
			owed: 0,
			busy: false,
			stalled: VecDeque::new(),
			fail_open: false,
			fail_writes: false,
		})))
	}

	fn state(&self) -> Ref<SimState> {
		self.0.borrow()
	}

	fn state_mut(&self) -> RefMut<SimState> {
		self.0.borrow_mut()
	}

	pub fn events(&self) -> Vec<SimEvent> {
		self.state().events.clone()
	}

	pub fn clear_events(&self) {
		self.state_mut().events.clear();
	}

	/// C2 transactions the target completed, in order
	pub fn executed(&self) -> Vec<Transaction> {
		self.state().executed.clone()
	}

	pub fn register(&self, addr: u8) -> u8 {
		self.state().registers[addr as usize]
	}

	pub fn set_register(&self, addr: u8, value: u8) {
		self.state_mut().registers[addr as usize] = value;
	}

	pub fn address(&self) -> u8 {
		self.state().address
	}

	pub fn pins(&self) -> LowBits {
		self.state().pins
	}

	pub fn multiphase(&self) -> bool {
		self.state().multiphase
	}

	/// A busy target never ends the WAIT phase of data transfers; the engine
	/// stalls on the first one. Clearing `busy` completes the stalled
	/// transfers, so their replies arrive late.
	pub fn set_busy(&self, busy: bool) {
		let mut state = self.state_mut();
		state.busy = busy;
		if !busy {
			state.resume();
		}
	}

	/// engine is stuck in a WAIT phase
	pub fn stalled(&self) -> bool {
		!self.state().stalled.is_empty()
	}

	pub fn fail_open(&self, fail: bool) {
		self.state_mut().fail_open = fail;
	}

	pub fn fail_writes(&self, fail: bool) {
		self.state_mut().fail_writes = fail;
	}
}

pub struct SimTarget {
	handle: SimTargetHandle,
	connected: bool,
}

impl SimTarget {
	pub fn handle(&self) -> &SimTargetHandle {
		&self.handle
	}

	fn check_connected(&self) -> C2Result<()> {
		if self.connected { Ok(()) } else { Err(C2Error::NotConnected) }
	}
}

impl Mpsse for SimTarget {
	type Endpoint = SimTargetHandle;

	fn open(endpoint: &SimTargetHandle, direction: u8, frequency: Frequency) -> C2Result<Self> {
		if endpoint.state().fail_open {
			return Err(C2Error::transport("simulated open failure"));
		}
		clock_setup(frequency)?;

		{
			let mut state = endpoint.state_mut();
			state.events.push(SimEvent::Open { direction, frequency });
			state.pins = LowBits::new(0, direction);
			state.replies.clear();
			state.owed = 0;
			state.stalled.clear();
		}
		debug!("simulated C2 target opened at {}", frequency);

		Ok(SimTarget {
			handle: endpoint.clone(),
			connected: true,
		})
	}

	fn is_connected(&self) -> bool {
		self.connected
	}

	fn write_data(&mut self, data: &[u8]) -> C2Result<()> {
		self.check_connected()?;
		let mut state = self.handle.state_mut();
		state.events.push(SimEvent::Write(data.to_vec()));
		state.write(data)
	}

	fn read_data_bytes(&mut self, count: usize, attempts: usize) -> C2Result<Vec<u8>> {
		self.check_connected()?;
		let mut state = self.handle.state_mut();
		state.events.push(SimEvent::Read { count, attempts });
		state.drop_late_replies();
		if state.owed > 0 || state.replies.len() < count {
			// whatever arrived belongs to this read and is lost with it
			let received = state.replies.len().min(count);
			state.replies.drain(..received);
			state.owed += count - received;
			return Err(C2Error::WaitTimeout);
		}
		Ok(state.replies.drain(..count).collect())
	}

	fn purge_buffers(&mut self) -> C2Result<()> {
		self.check_connected()?;
		let mut state = self.handle.state_mut();
		state.events.push(SimEvent::Purge);
		let purged = state.replies.len();
		state.owed = state.owed.saturating_sub(purged);
		state.replies.clear();
		Ok(())
	}

	fn close(&mut self, freeze: bool) -> C2Result<()> {
		if !self.connected {
			return Ok(());
		}
		let mut state = self.handle.state_mut();
		if !freeze {
			state.events.push(SimEvent::ResetPins);
			state.pins = LowBits::new(0, 0);
			state.multiphase = false;
		}
		state.events.push(SimEvent::Close { freeze });
		self.connected = false;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::c2::encode;

	fn open(handle: &SimTargetHandle) -> SimTarget {
		SimTarget::open(handle, 0, Frequency(1.0e6)).unwrap()
	}

	#[test]
	fn registers_follow_transactions() {
		let handle = SimTargetHandle::new();
		let mut sim = open(&handle);

		let mut stream = encode::write_addr(0x02);
		stream.extend(encode::write_data_byte(0x5a));
		stream.extend(encode::read_data_byte());
		stream.extend(encode::read_addr());
		sim.write_data(&stream).unwrap();

		assert_eq!(handle.register(0x02), 0x5a);
		assert_eq!(sim.read_data_bytes(2, 4).unwrap(), vec![0x5a, 0x02]);
	}

	#[test]
	fn missing_reply_times_out() {
		let handle = SimTargetHandle::new();
		let mut sim = open(&handle);
		match sim.read_data_bytes(1, 4) {
			Err(C2Error::WaitTimeout) => (),
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn busy_target_stalls_on_data_only() {
		let handle = SimTargetHandle::new();
		let mut sim = open(&handle);
		handle.set_busy(true);
		sim.write_data(&encode::write_addr(0x10)).unwrap();
		sim.write_data(&encode::write_data_byte(0x01)).unwrap();
		sim.write_data(&encode::write_addr(0x20)).unwrap();
		assert!(handle.stalled());
		assert_eq!(handle.executed(), vec![Transaction::WriteAddress(0x10)]);

		handle.set_busy(false);
		assert!(!handle.stalled());
		assert_eq!(handle.executed(), vec![
			Transaction::WriteAddress(0x10),
			Transaction::WriteData(0x01),
			Transaction::WriteAddress(0x20),
		]);
		assert_eq!(handle.register(0x10), 0x01);
	}

	#[test]
	fn reply_after_timeout_is_dropped() {
		let handle = SimTargetHandle::new();
		handle.set_register(0x10, 0xaa);
		let mut sim = open(&handle);
		handle.set_busy(true);
		let mut stream = encode::write_addr(0x10);
		stream.extend(encode::read_data_byte());
		sim.write_data(&stream).unwrap();
		assert!(sim.read_data_bytes(1, 4).unwrap_err().is_wait_timeout());

		// the late 0xaa shows up before the next reply
		handle.set_busy(false);
		sim.write_data(&encode::read_addr()).unwrap();
		assert_eq!(sim.read_data_bytes(1, 4).unwrap(), vec![0x10]);
	}

	#[test]
	fn purge_accounts_for_late_replies() {
		let handle = SimTargetHandle::new();
		handle.set_register(0x10, 0xaa);
		let mut sim = open(&handle);
		handle.set_busy(true);
		let mut stream = encode::write_addr(0x10);
		stream.extend(encode::read_data_byte());
		sim.write_data(&stream).unwrap();
		assert!(sim.read_data_bytes(1, 4).unwrap_err().is_wait_timeout());
		handle.set_busy(false);
		// late reply is already buffered, the purge takes it
		sim.purge_buffers().unwrap();

		sim.write_data(&encode::read_addr()).unwrap();
		assert_eq!(sim.read_data_bytes(1, 4).unwrap(), vec![0x10]);
	}

	#[test]
	fn close_is_idempotent() {
		let handle = SimTargetHandle::new();
		let mut sim = open(&handle);
		sim.close(false).unwrap();
		sim.close(false).unwrap();
		assert!(sim.write_data(&[0x87]).unwrap_err().is_not_connected());
		assert_eq!(handle.events(), vec![
			SimEvent::Open { direction: 0, frequency: Frequency(1.0e6) },
			SimEvent::ResetPins,
			SimEvent::Close { freeze: false },
		]);
	}

	#[test]
	fn unsupported_frequency_fails_open() {
		let handle = SimTargetHandle::new();
		assert!(SimTarget::open(&handle, 0, Frequency(100.0e6)).is_err());
		handle.fail_open(true);
		assert!(SimTarget::open(&handle, 0, Frequency(1.0e6)).is_err());
	}
}
