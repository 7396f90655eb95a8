use std::fmt;
use std::str;

use crate::c2::encode::WRITE_DATA_FRAME_LEN;
use crate::error::{
	C2Error,
	C2Result,
};

/// Default C2CK frequency: at 20MHz the shortest C2CK pulse is 30ns, the C2
/// specification requires at least 20ns.
pub const DEFAULT_FREQUENCY: Frequency = Frequency(20.0e6);

/// Maximum number of command bytes the engine accepts in one transfer.
pub const DEFAULT_PIPE_LEN: usize = 512;

/// Smallest pipe that still carries the longest C2 frame plus SEND_IMMEDIATE
/// with one byte to spare.
pub const MIN_PIPE_LEN: usize = WRITE_DATA_FRAME_LEN + 2;

#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub struct Frequency(pub f64);

impl Frequency {
	pub fn hz(&self) -> f64 {
		self.0
	}
}

impl Default for Frequency {
	fn default() -> Self {
		DEFAULT_FREQUENCY
	}
}

impl fmt::Display for Frequency {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let hz = self.0;
		if hz >= 1.0e6 {
			write!(f, "{}MHz", hz / 1.0e6)
		} else if hz >= 1.0e3 {
			write!(f, "{}kHz", hz / 1.0e3)
		} else {
			write!(f, "{}Hz", hz)
		}
	}
}

// accepts "20000000", "20M", "20MHz", "1.5mhz", "400k", "400 kHz"
impl str::FromStr for Frequency {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.trim().to_ascii_lowercase();
		let num = lower.trim_end_matches("hz").trim_end();
		let (num, scale) = match num.chars().last() {
			Some('k') => (&num[..num.len() - 1], 1.0e3),
			Some('m') => (&num[..num.len() - 1], 1.0e6),
			Some('g') => (&num[..num.len() - 1], 1.0e9),
			_ => (num, 1.0),
		};

		let value = with_context!(("invalid frequency: {:?}", s),
			Ok(num.trim().parse::<f64>()?)
		)? * scale;

		ensure!(value.is_finite() && value > 0.0, "frequency must be positive: {:?}", s);

		Ok(Frequency(value))
	}
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct C2Config {
	/// C2CK frequency; applied once when the transport is opened
	pub frequency: Frequency,
	/// transport limit for outstanding command bytes
	pub pipe_len: usize,
}

impl Default for C2Config {
	fn default() -> Self {
		C2Config {
			frequency: DEFAULT_FREQUENCY,
			pipe_len: DEFAULT_PIPE_LEN,
		}
	}
}

impl C2Config {
	pub fn with_frequency(frequency: Frequency) -> Self {
		C2Config {
			frequency,
			..C2Config::default()
		}
	}

	pub fn validate(&self) -> C2Result<()> {
		if self.pipe_len < MIN_PIPE_LEN {
			return Err(C2Error::invalid_argument(format!(
				"pipe length {} too short, need at least {}", self.pipe_len, MIN_PIPE_LEN)));
		}
		Ok(())
	}
}
