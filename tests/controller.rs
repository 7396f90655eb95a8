extern crate c2_mpsse;

use c2_mpsse::c2::encode;
use c2_mpsse::c2::{
	Transaction,
	would_exceed,
};
use c2_mpsse::mpsse::{
	SimEvent,
	SimTarget,
	SimTargetHandle,
};
use c2_mpsse::{
	BusState,
	C2Config,
	C2Controller,
	C2Error,
	Frequency,
};

fn setup() -> (SimTargetHandle, C2Controller<SimTarget>) {
	let handle = SimTargetHandle::new();
	let mut c2 = C2Controller::new(Frequency(1.0e6));
	c2.configure(&handle).unwrap();
	(handle, c2)
}

fn writes(handle: &SimTargetHandle) -> Vec<Vec<u8>> {
	handle.events().into_iter().filter_map(|e| match e {
		SimEvent::Write(data) => Some(data),
		_ => None,
	}).collect()
}

#[test]
fn writes_are_batched_until_sync() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	handle.clear_events();

	for addr in 0..10 {
		c2.write_addr(addr).unwrap();
		c2.write_data_byte(!addr).unwrap();
	}
	assert!(handle.events().is_empty());
	assert_eq!(c2.pending().len(), 10 * (encode::WRITE_ADDRESS_FRAME_LEN + encode::WRITE_DATA_FRAME_LEN));

	c2.sync().unwrap();
	assert_eq!(writes(&handle).len(), 1);
	assert!(c2.pending().is_empty());
	assert_eq!(handle.register(9), !9u8);
	assert_eq!(handle.executed().len(), 20);
}

#[test]
fn queued_frames_match_encoder() {
	let (_handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	for addr in 0..=255u8 {
		c2.write_addr(addr).unwrap();
		let pending = c2.pending();
		let frame = &pending[pending.len() - encode::WRITE_ADDRESS_FRAME_LEN..];
		// INS written with bit count 1, address right after it
		assert_eq!(frame[5..12], [0x1a, 0x01, 0x03, 0x18, 0x00, 0x00, addr]);
	}
}

#[test]
fn reads_flush_before_reading() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	handle.clear_events();

	c2.write_addr(0x05).unwrap();
	c2.write_data_byte(0x77).unwrap();
	assert_eq!(c2.read_data_byte().unwrap(), 0x77);
	assert_eq!(c2.read_addr().unwrap(), 0x05);

	let mut first = encode::write_addr(0x05);
	first.extend(encode::write_data_byte(0x77));
	first.extend(encode::read_data_byte());
	assert_eq!(handle.events(), vec![
		SimEvent::Write(first),
		SimEvent::Read { count: 1, attempts: 4 },
		SimEvent::Write(encode::read_addr()),
		SimEvent::Read { count: 1, attempts: 4 },
	]);
}

#[test]
fn register_file_round_trip() {
	let (handle, mut c2) = setup();
	handle.set_register(0x00, 0x16);
	let claim = c2.claim().unwrap();

	c2.write_addr(0x00).unwrap();
	assert_eq!(c2.read_data_byte().unwrap(), 0x16);

	c2.write_addr(0xb4).unwrap();
	c2.write_data_byte(0xa5).unwrap();
	c2.release(claim).unwrap();
	assert_eq!(handle.register(0xb4), 0xa5);
	assert_eq!(handle.address(), 0xb4);
	assert_eq!(handle.executed(), vec![
		Transaction::WriteAddress(0x00),
		Transaction::ReadData,
		Transaction::WriteAddress(0xb4),
		Transaction::WriteData(0xa5),
	]);
}

#[test]
fn reset_pulses_clock() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	c2.write_addr(0x01).unwrap();
	c2.sync().unwrap();
	handle.clear_events();

	c2.reset().unwrap();
	assert_eq!(handle.events(), vec![
		SimEvent::Write(vec![0x80, 0x02, 0x01]),
		SimEvent::Write(vec![0x80, 0x03, 0x01]),
	]);
}

#[test]
fn reset_flushes_queued_commands_first() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	handle.clear_events();

	c2.write_addr(0x01).unwrap();
	c2.reset().unwrap();
	assert_eq!(writes(&handle), vec![
		encode::write_addr(0x01),
		vec![0x80, 0x02, 0x01],
		vec![0x80, 0x03, 0x01],
	]);
}

#[test]
fn flush_exactly_at_pipe_limit() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	handle.clear_events();

	let frame = encode::write_addr(0x42);
	let limit = c2.config().pipe_len;
	let mut queued = 0;
	while !would_exceed(c2.pending(), &frame, limit) {
		c2.write_addr(0x42).unwrap();
		queued += 1;
	}
	// 30 frames of 17 bytes, one more would leave no room for SEND_IMMEDIATE
	assert_eq!(queued, 30);
	assert!(handle.events().is_empty());

	c2.write_addr(0x42).unwrap();
	let w = writes(&handle);
	assert_eq!(w.len(), 1);
	assert_eq!(w[0].len(), 30 * frame.len());
	assert_eq!(c2.pending(), &frame[..]);
}

#[test]
fn small_pipe_flushes_every_frame() {
	let handle = SimTargetHandle::new();
	let mut c2: C2Controller<SimTarget> = C2Controller::with_config(C2Config {
		frequency: Frequency(1.0e6),
		pipe_len: encode::WRITE_DATA_FRAME_LEN + 2,
	}).unwrap();
	c2.configure(&handle).unwrap();
	let _claim = c2.claim().unwrap();
	handle.clear_events();

	c2.write_data_byte(1).unwrap();
	c2.write_data_byte(2).unwrap();
	c2.write_data_byte(3).unwrap();
	assert_eq!(writes(&handle).len(), 2);
	assert_eq!(c2.pending(), &encode::write_data_byte(3)[..]);
}

#[test]
fn frozen_close_disconnects() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	handle.clear_events();

	c2.close(true).unwrap();
	assert_eq!(c2.state(), BusState::Closed);
	assert_eq!(handle.events(), vec![SimEvent::Close { freeze: true }]);

	assert!(c2.write_addr(0).unwrap_err().is_not_connected());
	assert!(c2.write_data_byte(0).unwrap_err().is_not_connected());
	assert!(c2.read_addr().unwrap_err().is_not_connected());
	assert!(c2.read_data_byte().unwrap_err().is_not_connected());
	assert!(c2.reset().unwrap_err().is_not_connected());
	assert!(c2.configure(&handle).unwrap_err().is_not_connected());

	// already disconnected
	c2.close(false).unwrap();
	assert_eq!(handle.events().len(), 1);
}

#[test]
fn close_resets_pins_and_sends_queued_writes() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	handle.clear_events();

	c2.write_addr(0x20).unwrap();
	c2.close(false).unwrap();
	assert_eq!(handle.events(), vec![
		SimEvent::Write(encode::write_addr(0x20)),
		SimEvent::ResetPins,
		SimEvent::Close { freeze: false },
	]);
	assert_eq!(handle.address(), 0x20);
}

#[test]
fn busy_target_stalls_queued_writes() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	handle.set_busy(true);

	c2.write_addr(0x02).unwrap();
	c2.write_data_byte(0x01).unwrap();
	c2.write_addr(0x03).unwrap();
	c2.sync().unwrap();
	assert!(c2.pending().is_empty());
	assert!(handle.stalled());
	assert_eq!(handle.register(0x02), 0x00);

	handle.set_busy(false);
	assert_eq!(handle.register(0x02), 0x01);
	assert_eq!(c2.read_addr().unwrap(), 0x03);
}

#[test]
fn read_timeout_doesnt_leak_late_reply() {
	let (handle, mut c2) = setup();
	handle.set_register(0x10, 0xaa);
	let _claim = c2.claim().unwrap();
	handle.set_busy(true);

	c2.write_addr(0x10).unwrap();
	match c2.read_data_byte() {
		Err(C2Error::WaitTimeout) => (),
		other => panic!("unexpected result {:?}", other),
	}
	assert!(c2.pending().is_empty());
	assert_eq!(handle.events().last(), Some(&SimEvent::Purge));

	// the target finishes the read; its 0xaa must not answer the next one
	handle.set_busy(false);
	assert_eq!(c2.read_addr().unwrap(), 0x10);
	assert_eq!(c2.read_data_byte().unwrap(), 0xaa);
}

#[test]
fn reply_arriving_during_next_read_is_skipped() {
	let (handle, mut c2) = setup();
	handle.set_register(0x10, 0xaa);
	let _claim = c2.claim().unwrap();
	handle.set_busy(true);

	c2.write_addr(0x10).unwrap();
	assert!(c2.read_data_byte().unwrap_err().is_wait_timeout());
	// Read Address queues up behind the stalled transfer
	assert!(c2.read_addr().unwrap_err().is_wait_timeout());

	handle.set_busy(false);
	assert_eq!(c2.read_addr().unwrap(), 0x10);
}

#[test]
fn too_small_pipe_is_rejected() {
	let result = C2Controller::<SimTarget>::with_config(C2Config {
		frequency: Frequency(1.0e6),
		pipe_len: encode::WRITE_DATA_FRAME_LEN,
	});
	match result {
		Err(C2Error::InvalidArgument(_)) => (),
		Err(e) => panic!("unexpected error {:?}", e),
		Ok(_) => panic!("pipe length {} accepted", encode::WRITE_DATA_FRAME_LEN),
	}
}

#[test]
fn failed_flush_doesnt_replay() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();

	c2.write_addr(0x30).unwrap();
	handle.fail_writes(true);
	match c2.sync() {
		Err(C2Error::Transport(_)) => (),
		other => panic!("unexpected result {:?}", other),
	}
	handle.fail_writes(false);
	handle.clear_events();

	c2.write_addr(0x31).unwrap();
	c2.sync().unwrap();
	assert_eq!(writes(&handle), vec![encode::write_addr(0x31)]);
}

#[test]
fn purge_keeps_queued_commands() {
	let (handle, mut c2) = setup();
	let _claim = c2.claim().unwrap();
	c2.write_addr(0x40).unwrap();
	c2.purge().unwrap();
	assert_eq!(c2.pending(), &encode::write_addr(0x40)[..]);
	assert!(handle.events().contains(&SimEvent::Purge));
}

#[test]
fn failed_configure_stays_unconfigured() {
	let handle = SimTargetHandle::new();
	handle.fail_open(true);
	let mut c2 = C2Controller::<SimTarget>::new(Frequency(1.0e6));
	match c2.configure(&handle) {
		Err(C2Error::Transport(_)) => (),
		other => panic!("unexpected result {:?}", other),
	}
	assert_eq!(c2.state(), BusState::Unconfigured);

	let mut fast = C2Controller::<SimTarget>::new(Frequency(50.0e6));
	handle.fail_open(false);
	assert!(fast.configure(&handle).is_err());
}
