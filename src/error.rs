use std::io;

use failure::Fail;

pub type C2Result<T> = Result<T, C2Error>;

/// Error kinds surfaced by the C2 controller and its transports.
///
/// Nothing is retried internally; callers match on the variant.
#[derive(Debug, Fail)]
pub enum C2Error {
	/// operation attempted before `configure` or after `close`
	#[fail(display = "C2 controller not connected")]
	NotConnected,
	#[fail(display = "invalid argument: {}", _0)]
	InvalidArgument(String),
	#[fail(display = "transport error: {}", _0)]
	Transport(#[cause] io::Error),
	/// target never drove C2D high during a data WAIT phase
	#[fail(display = "C2 target didn't signal ready within the wait window")]
	WaitTimeout,
}

impl C2Error {
	pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
		C2Error::InvalidArgument(msg.into())
	}

	pub fn transport<S: Into<String>>(msg: S) -> Self {
		C2Error::Transport(io::Error::new(io::ErrorKind::Other, msg.into()))
	}

	pub fn is_not_connected(&self) -> bool {
		match self {
			C2Error::NotConnected => true,
			_ => false,
		}
	}

	pub fn is_wait_timeout(&self) -> bool {
		match self {
			C2Error::WaitTimeout => true,
			_ => false,
		}
	}
}

impl From<io::Error> for C2Error {
	fn from(e: io::Error) -> Self {
		C2Error::Transport(e)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn io_errors_become_transport_errors() {
		let e: C2Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
		match e {
			C2Error::Transport(ref inner) => assert_eq!(inner.kind(), io::ErrorKind::BrokenPipe),
			ref other => panic!("unexpected error {:?}", other),
		}
		assert!(!e.is_not_connected());
	}

	#[test]
	fn display() {
		assert_eq!(C2Error::NotConnected.to_string(), "C2 controller not connected");
		assert_eq!(C2Error::invalid_argument("empty frame").to_string(), "invalid argument: empty frame");
	}
}
