/// Silicon Labs C2 master on top of an MPSSE engine.
///
/// Pin assignment (low GPIO byte):
/// - AD0: C2CK
/// - AD1: C2D output
/// - AD2: C2D input (sampled by the engine, never driven)
/// - AD5: C2D input for the end of WAIT detection (CLK_WAIT_ON_HIGH)
///
/// Writes are queued and sent in batches; reads flush the queue and wait
/// for the reply, so they cost a full round trip each.

use std::time::Duration;

use crate::config::{
	C2Config,
	Frequency,
};
use crate::error::{
	C2Error,
	C2Result,
};
use crate::mpsse::{
	LowBits,
	Mpsse,
	reliable_sleep,
};

mod batch;
pub mod decode;
pub mod encode;

pub use self::batch::{
	Batcher,
	would_exceed,
};
pub use self::encode::{
	Instruction,
	Transaction,
};

use self::encode::{
	CK_BIT,
	D_O_BIT,
};

// C2 requires a reset pulse of more than 20us and a pause of more than 2us
const RESET_PULSE: Duration = Duration::from_micros(20);
const RESET_PAUSE: Duration = Duration::from_micros(2);

// attempt factor for reading back the single reply byte
const READ_ATTEMPTS: usize = 4;

// all GPIOs need a defined level before MPSSE takes over
const IDLE_PINS: LowBits = LowBits { value: CK_BIT | D_O_BIT, direction: 0 };
const CLAIMED_PINS: LowBits = LowBits { value: CK_BIT | D_O_BIT, direction: CK_BIT };
const RESET_ASSERT: LowBits = LowBits { value: D_O_BIT, direction: CK_BIT };
const RESET_RELEASE: LowBits = LowBits { value: CK_BIT | D_O_BIT, direction: CK_BIT };

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum BusState {
	Unconfigured,
	Released,
	Claimed,
	Closed,
}

/// Proof of bus ownership returned by `claim`; hand it back to `release`.
#[must_use = "the bus stays claimed until the token is passed to `release`"]
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct BusClaim {
	id: u64,
}

pub struct C2Controller<T: Mpsse> {
	config: C2Config,
	transport: Option<T>,
	batcher: Batcher,
	state: BusState,
	claims: u64,
}

fn connected<T: Mpsse>(transport: &mut Option<T>) -> C2Result<&mut T> {
	match transport {
		Some(t) if t.is_connected() => Ok(t),
		_ => Err(C2Error::NotConnected),
	}
}

impl<T: Mpsse> C2Controller<T> {
	pub fn new(frequency: Frequency) -> Self {
		Self::build(C2Config::with_frequency(frequency))
	}

	/// Fails for a `pipe_len` too small to carry the longest C2 frame.
	pub fn with_config(config: C2Config) -> C2Result<Self> {
		config.validate()?;
		Ok(Self::build(config))
	}

	fn build(config: C2Config) -> Self {
		C2Controller {
			config,
			transport: None,
			batcher: Batcher::new(config.pipe_len),
			state: BusState::Unconfigured,
			claims: 0,
		}
	}

	pub fn config(&self) -> &C2Config {
		&self.config
	}

	pub fn state(&self) -> BusState {
		self.state
	}

	/// commands queued but not yet sent
	pub fn pending(&self) -> &[u8] {
		self.batcher.pending()
	}

	/// The underlying engine, for anything the C2 layer doesn't cover.
	pub fn transport(&self) -> Option<&T> {
		self.transport.as_ref()
	}

	/// Open the engine and put the pins into their idle state.
	pub fn configure(&mut self, endpoint: &T::Endpoint) -> C2Result<()> {
		match self.state {
			BusState::Unconfigured => (),
			BusState::Closed => return Err(C2Error::NotConnected),
			_ => return Err(C2Error::invalid_argument("C2 controller already configured")),
		}

		let mut transport = T::open(endpoint, 0, self.config.frequency)?;
		transport.set_low_bits(IDLE_PINS)?;
		// 3-phase clocking gives the setup/hold margin C2D sampling needs
		transport.set_multiphase_clock(true)?;

		self.transport = Some(transport);
		self.state = BusState::Released;
		debug!("C2 controller configured at {}", self.config.frequency);
		Ok(())
	}

	/// Take the bus: drive C2CK high.
	pub fn claim(&mut self) -> C2Result<BusClaim> {
		let transport = connected(&mut self.transport)?;
		if self.state == BusState::Claimed {
			return Err(C2Error::invalid_argument("C2 bus already claimed"));
		}
		// TODO: implement C2 pin sharing
		self.batcher.flush(transport)?;
		transport.set_low_bits(CLAIMED_PINS)?;

		self.claims += 1;
		self.state = BusState::Claimed;
		debug!("C2 bus claimed");
		Ok(BusClaim { id: self.claims })
	}

	/// Send everything still queued and let go of the bus.
	pub fn release(&mut self, claim: BusClaim) -> C2Result<()> {
		let transport = connected(&mut self.transport)?;
		if self.state != BusState::Claimed || claim.id != self.claims {
			return Err(C2Error::invalid_argument(format!("stale C2 bus claim {}", claim.id)));
		}
		self.batcher.flush(transport)?;
		transport.set_low_bits(IDLE_PINS)?;

		self.state = BusState::Released;
		debug!("C2 bus released");
		Ok(())
	}

	/// Reset the target with a long low pulse on C2CK.
	///
	/// Engines reporting less latency than the pulse/pause minimum get an
	/// explicit delay.
	pub fn reset(&mut self) -> C2Result<()> {
		let transport = connected(&mut self.transport)?;
		self.batcher.flush(transport)?;

		let latency = transport.latency();
		transport.set_low_bits(RESET_ASSERT)?;
		if latency < RESET_PULSE {
			reliable_sleep(RESET_PULSE - latency);
		}
		transport.set_low_bits(RESET_RELEASE)?;
		if latency < RESET_PAUSE {
			reliable_sleep(RESET_PAUSE - latency);
		}

		debug!("C2 target reset");
		Ok(())
	}

	/// Close the engine; `freeze` leaves the pins and configuration as they
	/// are. Queued commands are sent first.
	pub fn close(&mut self, freeze: bool) -> C2Result<()> {
		let result = match self.transport.take() {
			Some(mut transport) => {
				let flushed = if transport.is_connected() {
					self.batcher.flush(&mut transport)
				} else {
					Ok(())
				};
				self.batcher.discard();
				flushed.and(transport.close(freeze))
			},
			None => Ok(()),
		};
		self.state = BusState::Closed;
		result
	}

	/// Drop data the engine still holds; queued commands are not affected.
	pub fn purge(&mut self) -> C2Result<()> {
		connected(&mut self.transport)?.purge_buffers()
	}

	/// Send all queued commands.
	pub fn sync(&mut self) -> C2Result<()> {
		let transport = connected(&mut self.transport)?;
		self.batcher.flush(transport)
	}

	fn enqueue(&mut self, transaction: Transaction) -> C2Result<()> {
		let transport = connected(&mut self.transport)?;
		debug_assert!(self.state == BusState::Claimed, "C2 transaction on an unclaimed bus");
		trace!("C2 {:?}", transaction);
		self.batcher.enqueue(transport, &transaction.encode())
	}

	fn read(&mut self, transaction: Transaction) -> C2Result<u8> {
		self.enqueue(transaction)?;
		let transport = connected(&mut self.transport)?;
		self.batcher.flush(transport)?;
		let data = match transport.read_data_bytes(1, READ_ATTEMPTS) {
			Ok(data) => data,
			Err(e) => {
				// the engine may still deliver the reply; the transport drops
				// it once it shows up, whatever arrived already goes now
				self.batcher.discard();
				if let Err(purge_err) = transport.purge_buffers() {
					warn!("C2 purge after failed read: {}", purge_err);
				}
				return Err(e);
			},
		};
		data.first().cloned().ok_or_else(|| C2Error::transport("empty C2 read reply"))
	}

	/// Queued C2 Write Address; the bus must be claimed.
	pub fn write_addr(&mut self, addr: u8) -> C2Result<()> {
		self.enqueue(Transaction::WriteAddress(addr))
	}

	/// Immediate C2 Read Address; the bus must be claimed.
	pub fn read_addr(&mut self) -> C2Result<u8> {
		self.read(Transaction::ReadAddress)
	}

	/// Queued C2 Write Data of a single byte; the bus must be claimed.
	pub fn write_data_byte(&mut self, val: u8) -> C2Result<()> {
		self.enqueue(Transaction::WriteData(val))
	}

	/// Immediate C2 Read Data of a single byte; the bus must be claimed.
	pub fn read_data_byte(&mut self) -> C2Result<u8> {
		self.read(Transaction::ReadData)
	}
}
