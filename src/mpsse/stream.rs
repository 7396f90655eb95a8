/// MPSSE engine behind a character device that takes raw MPSSE commands and
/// returns the engine's reply bytes (e.g. a userspace USB bridge). A plain
/// write(2) gives no per-write latency, so the default zero latency applies.

use std::fs;
use std::io::{
	self,
	Read,
	Write,
};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{
	Path,
	PathBuf,
};
use std::time::Duration;

use crate::config::Frequency;
use crate::error::{
	C2Error,
	C2Result,
};

use super::{
	LowBits,
	Mpsse,
	clock_setup,
	reliable_sleep,
};
use super::opcodes::*;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
// polls per read attempt / for a full write
const ATTEMPT_POLLS: usize = 16;
const WRITE_POLLS: usize = 1000;

fn path_error(path: &Path, e: io::Error) -> C2Error {
	C2Error::Transport(io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
}

pub struct StreamMpsse {
	file: Option<fs::File>,
	path: PathBuf,
	frequency: Frequency,
	multiphase: bool,
	// reply bytes still due from reads that timed out
	owed: usize,
}

impl StreamMpsse {
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// TCK frequency the engine generates; 3-phase clocking stretches each
	/// cycle by half a period
	pub fn actual_frequency(&self) -> Frequency {
		if self.multiphase {
			Frequency(self.frequency.hz() * 2.0 / 3.0)
		} else {
			self.frequency
		}
	}

	fn file(&mut self) -> C2Result<&mut fs::File> {
		self.file.as_mut().ok_or(C2Error::NotConnected)
	}

	fn write_all(&mut self, mut data: &[u8]) -> C2Result<()> {
		let mut polls = 0;
		while !data.is_empty() {
			match self.file()?.write(data) {
				Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "MPSSE stream closed").into()),
				Ok(n) => data = &data[n..],
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
				Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
					polls += 1;
					if polls > WRITE_POLLS {
						return Err(io::Error::new(io::ErrorKind::TimedOut, "MPSSE stream doesn't accept data").into());
					}
					reliable_sleep(POLL_INTERVAL);
				},
				Err(e) => return Err(e.into()),
			}
		}
		Ok(())
	}
}

impl Mpsse for StreamMpsse {
	type Endpoint = Path;

	// TODO: exclusive open / file locking?
	fn open(path: &Path, direction: u8, frequency: Frequency) -> C2Result<Self> {
		let setup = clock_setup(frequency)?;
		let file = fs::OpenOptions::new()
			.read(true)
			.write(true)
			.custom_flags(libc::O_NONBLOCK)
			.open(path)
			.map_err(|e| path_error(path, e))?;

		let mut mpsse = StreamMpsse {
			file: Some(file),
			path: path.to_owned(),
			frequency: setup.actual,
			multiphase: false,
			owed: 0,
		};

		let mut init = vec![LOOPBACK_END];
		init.extend_from_slice(&setup.commands);
		init.extend_from_slice(&LowBits::new(0, direction).command());
		mpsse.write_all(&init)?;

		info!("MPSSE {}: TCK {} (requested {})", path.display(), setup.actual, frequency);

		Ok(mpsse)
	}

	fn is_connected(&self) -> bool {
		self.file.is_some()
	}

	fn write_data(&mut self, data: &[u8]) -> C2Result<()> {
		trace!("MPSSE {}: write {} bytes", self.path.display(), data.len());
		self.write_all(data)
	}

	fn read_data_bytes(&mut self, count: usize, attempts: usize) -> C2Result<Vec<u8>> {
		self.write_all(&[SEND_IMMEDIATE])?;

		let mut result = vec![0u8; count];
		let mut late = [0u8; 64];
		let mut filled = 0;
		let mut polls = 0;
		while self.owed > 0 || filled < count {
			// late replies come first in the stream and belong to no one
			let r = if self.owed > 0 {
				let n = self.owed.min(late.len());
				self.file()?.read(&mut late[..n])
			} else {
				self.file()?.read(&mut result[filled..])
			};
			match r {
				Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "MPSSE stream closed").into()),
				Ok(n) if self.owed > 0 => {
					debug!("MPSSE {}: dropped {} late reply bytes", self.path.display(), n);
					self.owed -= n;
				},
				Ok(n) => filled += n,
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
				Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
					polls += 1;
					if polls > attempts * ATTEMPT_POLLS {
						// engine is still stuck in CLK_WAIT_ON_HIGH
						debug!("MPSSE {}: got {} of {} reply bytes", self.path.display(), filled, count);
						self.owed += count - filled;
						return Err(C2Error::WaitTimeout);
					}
					reliable_sleep(POLL_INTERVAL);
				},
				Err(e) => return Err(e.into()),
			}
		}

		Ok(result)
	}

	fn purge_buffers(&mut self) -> C2Result<()> {
		let mut buf = [0u8; 64];
		let mut stale = 0;
		loop {
			match self.file()?.read(&mut buf) {
				Ok(0) => break,
				Ok(n) => stale += n,
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
				Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) => return Err(e.into()),
			}
		}
		if stale > 0 {
			debug!("MPSSE {}: purged {} stale bytes", self.path.display(), stale);
		}
		self.owed = self.owed.saturating_sub(stale);
		Ok(())
	}

	fn close(&mut self, freeze: bool) -> C2Result<()> {
		if self.file.is_none() {
			return Ok(());
		}
		let result = if freeze {
			Ok(())
		} else {
			let mut reset = LowBits::new(0, 0).command().to_vec();
			reset.push(DISABLE_CLK_3PHASE);
			self.write_all(&reset)
		};
		self.file = None;
		debug!("MPSSE {}: closed (freeze: {})", self.path.display(), freeze);
		result
	}

	fn set_multiphase_clock(&mut self, enable: bool) -> C2Result<()> {
		let cmd = if enable { ENABLE_CLK_3PHASE } else { DISABLE_CLK_3PHASE };
		self.write_all(&[cmd])?;
		self.multiphase = enable;
		Ok(())
	}
}

impl Drop for StreamMpsse {
	fn drop(&mut self) {
		if let Err(e) = self.close(false) {
			warn!("MPSSE {}: failed to reset pins on drop: {}", self.path.display(), e);
		}
	}
}
