use crate::config::Frequency;
use crate::error::{
	C2Error,
	C2Result,
};

use super::opcodes::*;

// TCK = base / (divisor + 1); base is half the 60MHz master clock, or 1/5 of
// that with the divide-by-5 prescaler enabled.
const BUS_CLOCK_HIGH: f64 = 30.0e6;
const BUS_CLOCK_BASE: f64 = 6.0e6;
const DIVISOR_MAX: f64 = 0xffff as f64;

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ClockSetup {
	/// prescaler selection + TCK_DIVISOR command
	pub commands: [u8; 4],
	/// frequency actually generated
	pub actual: Frequency,
}

pub fn clock_setup(frequency: Frequency) -> C2Result<ClockSetup> {
	let hz = frequency.hz();
	if !(hz.is_finite() && hz > 0.0) || hz > BUS_CLOCK_HIGH {
		return Err(C2Error::transport(format!("unsupported frequency {}", frequency)));
	}

	let (prescaler, base) = if hz > BUS_CLOCK_BASE {
		(DISABLE_CLK_DIV5, BUS_CLOCK_HIGH)
	} else {
		(ENABLE_CLK_DIV5, BUS_CLOCK_BASE)
	};

	// round to the nearest divisor
	let divisor = ((base + hz / 2.0) / hz).floor() - 1.0;
	if divisor > DIVISOR_MAX {
		return Err(C2Error::transport(format!("frequency {} too low", frequency)));
	}
	let divisor = divisor.max(0.0) as u16;

	Ok(ClockSetup {
		commands: [prescaler, TCK_DIVISOR, divisor as u8, (divisor >> 8) as u8],
		actual: Frequency(base / (f64::from(divisor) + 1.0)),
	})
}
