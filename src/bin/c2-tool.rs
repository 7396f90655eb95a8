#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate c2_mpsse;
use c2_mpsse::*;

use std::ops::Range;
use std::path::Path;
use std::process::exit;

use c2_mpsse::c2::{
	Transaction,
	decode,
};
use c2_mpsse::mpsse::{
	Mpsse,
	SimTarget,
	SimTargetHandle,
	StreamMpsse,
};

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

// register addresses and values: decimal or 0x-prefixed hex
fn get_byte(matches: &clap::ArgMatches, name: &str) -> AResult<u8> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	let parsed = if param.starts_with("0x") || param.starts_with("0X") {
		u8::from_str_radix(&param[2..], 16)
	} else {
		param.parse::<u8>()
	};
	parsed.map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn read_register<T: Mpsse>(c2: &mut C2Controller<T>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let reg = get_byte(sub_m, "REG")?;
	c2.write_addr(reg)?;
	let value = c2.read_data_byte()?;
	println!("0x{:02x}: 0x{:02x}", reg, value);
	Ok(())
}

fn write_register<T: Mpsse>(c2: &mut C2Controller<T>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let reg = get_byte(sub_m, "REG")?;
	let value = get_byte(sub_m, "VALUE")?;
	c2.write_addr(reg)?;
	c2.write_data_byte(value)?;
	c2.sync()?;
	info!("wrote 0x{:02x} to register 0x{:02x}", value, reg);
	Ok(())
}

fn register_range(start: usize, count: usize) -> AResult<Range<usize>> {
	match start.checked_add(count) {
		Some(end) if end <= 0x100 => Ok(start..end),
		_ => bail!("register range 0x{:02x}+{} exceeds 0xff", start, count),
	}
}

fn dump_registers<T: Mpsse>(c2: &mut C2Controller<T>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let start = get_byte(sub_m, "START")? as usize;
	let count: usize = get_param(sub_m, "COUNT")?;
	let regs = register_range(start, count)?;

	let mut data = Vec::with_capacity(count);
	for reg in regs {
		c2.write_addr(reg as u8)?;
		data.push(c2.read_data_byte()?);
	}

	for (i, b) in data.iter().enumerate() {
		if 0 == i % 16 {
			print!("{:02x} ", start + i);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", b);
		if 15 == i % 16 {
			println!("");
		}
	}
	if 0 != data.len() % 16 {
		println!("");
	}
	Ok(())
}

fn read_address<T: Mpsse>(c2: &mut C2Controller<T>) -> AResult<()> {
	println!("address register: 0x{:02x}", c2.read_addr()?);
	Ok(())
}

fn bus_command<T: Mpsse>(c2: &mut C2Controller<T>, matches: &clap::ArgMatches) -> AResult<()> {
	match matches.subcommand() {
		("reset", _) => {
			c2.reset()?;
			info!("C2 target reset");
			Ok(())
		},
		("read", Some(sub_m)) => read_register(c2, sub_m),
		("write", Some(sub_m)) => write_register(c2, sub_m),
		("dump", Some(sub_m)) => dump_registers(c2, sub_m),
		("address", _) => read_address(c2),
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn run<T: Mpsse>(endpoint: &T::Endpoint, matches: &clap::ArgMatches) -> AResult<()> {
	let frequency = if matches.is_present("frequency") {
		get_param(matches, "frequency")?
	} else {
		Frequency::default()
	};

	let mut c2 = C2Controller::<T>::new(frequency);
	c2.configure(endpoint)?;

	let result = match c2.claim() {
		Ok(claim) => {
			let result = bus_command(&mut c2, matches);
			if let Err(e) = c2.release(claim) {
				error!("Failed to release C2 bus: {}", e);
			}
			result
		},
		Err(e) => Err(e.into()),
	};

	if let Err(e) = c2.close(matches.is_present("freeze")) {
		error!("Failed to close C2 controller: {}", e);
	}

	result
}

fn trace() -> AResult<()> {
	let transactions = [
		Transaction::WriteAddress(0x00),
		Transaction::ReadAddress,
		Transaction::WriteData(0x00),
		Transaction::ReadData,
	];
	for t in transactions.iter() {
		let frame = t.encode();
		print!("{:?} ({} bytes):", t, frame.len());
		for b in &frame {
			print!(" {:02x}", b);
		}
		println!("");
		for cmd in decode::parse(&frame)? {
			println!("    {:?}", cmd);
		}
	}
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg device: -d --device +takes_value "MPSSE command stream (character device)")
		(@arg simulate: --simulate "talk to a simulated C2 target instead of a device")
		(@arg frequency: -f --frequency +takes_value "C2CK frequency (default: 20MHz)")
		(@arg freeze: --freeze "leave pins and engine configuration as they are on exit")
		(@subcommand read =>
			(about: "read C2 data register")
			(@arg REG: +required "register address")
		)
		(@subcommand write =>
			(about: "write C2 data register")
			(@arg REG: +required "register address")
			(@arg VALUE: +required "byte to write")
		)
		(@subcommand dump =>
			(about: "dump a range of C2 data registers")
			(@arg START: +required "first register address")
			(@arg COUNT: +required "number of registers")
		)
		(@subcommand address =>
			(about: "read the C2 address register")
		)
		(@subcommand reset =>
			(about: "reset the C2 target")
		)
		(@subcommand trace =>
			(about: "show the MPSSE commands sent for each C2 transaction")
		)
	).get_matches();

	if let ("trace", _) = matches.subcommand() {
		return trace();
	}

	if matches.is_present("simulate") {
		run::<SimTarget>(&SimTargetHandle::new(), &matches)
	} else {
		let device = match matches.value_of("device") {
			Some(d) => d,
			None => bail!("either --device or --simulate is required"),
		};
		run::<StreamMpsse>(Path::new(device), &matches)
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn register_range_bounds() {
		assert_eq!(register_range(0x00, 0x100).unwrap(), 0x00..0x100);
		assert_eq!(register_range(0xf0, 0x10).unwrap(), 0xf0..0x100);
		assert!(register_range(0xf0, 0x11).is_err());
		assert!(register_range(0x01, usize::max_value()).is_err());
	}
}
