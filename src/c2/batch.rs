use crate::error::{
	C2Error,
	C2Result,
};
use crate::mpsse::Mpsse;

/// Collects encoded frames until the engine's pipe would overflow or a read
/// needs the queued commands executed.
#[derive(Clone, Debug)]
pub struct Batcher {
	buffer: Vec<u8>,
	limit: usize,
}

/// Whether appending `next_frame` to `buffer` leaves no room for the
/// SEND_IMMEDIATE byte the transport appends to a read.
pub fn would_exceed(buffer: &[u8], next_frame: &[u8], limit: usize) -> bool {
	buffer.len() + next_frame.len() + 1 >= limit
}

impl Batcher {
	pub fn new(limit: usize) -> Self {
		Batcher {
			buffer: Vec::with_capacity(limit),
			limit,
		}
	}

	pub fn limit(&self) -> usize {
		self.limit
	}

	pub fn pending(&self) -> &[u8] {
		&self.buffer
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	pub fn would_exceed(&self, next_frame: &[u8]) -> bool {
		would_exceed(&self.buffer, next_frame, self.limit)
	}

	pub fn enqueue<T: Mpsse + ?Sized>(&mut self, transport: &mut T, frame: &[u8]) -> C2Result<()> {
		if frame.is_empty() {
			return Err(C2Error::invalid_argument("empty command frame"));
		}
		if would_exceed(&[], frame, self.limit) {
			return Err(C2Error::invalid_argument(format!(
				"command frame of {} bytes never fits the {} byte pipe", frame.len(), self.limit
			)));
		}
		if self.would_exceed(frame) {
			trace!("pipe limit reached with {} pending bytes, flushing", self.buffer.len());
			self.flush(transport)?;
		}
		self.buffer.extend_from_slice(frame);
		Ok(())
	}

	// the buffer is dropped on failure too: replaying half-sent frames after
	// a transport error would corrupt the next transaction
	pub fn flush<T: Mpsse + ?Sized>(&mut self, transport: &mut T) -> C2Result<()> {
		if self.buffer.is_empty() {
			return Ok(());
		}
		let result = transport.write_data(&self.buffer);
		if let Err(ref e) = result {
			warn!("discarding {} pending command bytes: {}", self.buffer.len(), e);
		}
		self.buffer.clear();
		result
	}

	pub fn discard(&mut self) {
		self.buffer.clear();
	}
}
