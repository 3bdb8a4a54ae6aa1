use std::sync::{Arc, Mutex};

use proptest::collection::vec;
use proptest::prelude::*;
use tempfile::tempdir;

use seglog::{
    Log, LogConfig, LogError, LogEvent, LogEventListener, PlainCodec, Record, SegmentConfig,
};

/// Three index entries per segment so rotation happens quickly.
fn small_config() -> LogConfig {
    LogConfig {
        segment: SegmentConfig {
            max_store_bytes: u64::MAX,
            max_index_bytes: 3 * 12,
        },
        codec: Arc::new(PlainCodec),
        ..Default::default()
    }
}

#[test]
fn test_append_and_read_across_rotation() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), small_config()).unwrap();

    let payloads: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
    for (i, payload) in payloads.iter().enumerate() {
        let offset = log.append(&mut Record::new(payload.clone())).unwrap();
        assert_eq!(offset, i as u64);
    }

    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(&log.read(i as u64).unwrap().value, payload);
    }
}

#[test]
fn test_reopen_restores_offset_range() {
    let dir = tempdir().unwrap();
    {
        let log = Log::open(dir.path(), small_config()).unwrap();
        for i in 0..7u8 {
            log.append(&mut Record::new(vec![i])).unwrap();
        }
        log.close().unwrap();
    }

    let log = Log::open(dir.path(), small_config()).unwrap();
    assert_eq!(log.lowest_offset().unwrap(), 0);
    assert_eq!(log.highest_offset().unwrap(), 6);
    assert_eq!(log.read(4).unwrap().value, vec![4u8]);

    let offset = log.append(&mut Record::new(b"resumed".to_vec())).unwrap();
    assert_eq!(offset, 7);
}

#[test]
fn test_read_out_of_range_offset() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), small_config()).unwrap();
    log.append(&mut Record::new(b"only".to_vec())).unwrap();

    let err = log.read(99).unwrap_err();
    assert!(matches!(err, LogError::OffsetOutOfRange { offset: 99 }));
}

#[test]
fn test_truncate_removes_whole_segments_only() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), small_config()).unwrap();
    // Three segments: offsets 0..3, 3..6, 6..9.
    for i in 0..9u8 {
        log.append(&mut Record::new(vec![i])).unwrap();
    }

    log.truncate(4).unwrap();

    // The first segment (0..3) is gone; the straddling second one survives.
    assert_eq!(log.lowest_offset().unwrap(), 3);
    assert!(matches!(
        log.read(1).unwrap_err(),
        LogError::OffsetOutOfRange { offset: 1 }
    ));
    assert_eq!(log.read(5).unwrap().value, vec![5u8]);
    assert_eq!(log.highest_offset().unwrap(), 8);
}

#[test]
fn test_truncate_at_segment_last_offset_keeps_segment() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), small_config()).unwrap();
    // Two segments: offsets 0..3 and 3..6.
    for i in 0..6u8 {
        log.append(&mut Record::new(vec![i])).unwrap();
    }

    // Offset 2 is the first segment's last record; it must stay readable.
    log.truncate(2).unwrap();
    assert_eq!(log.lowest_offset().unwrap(), 0);
    assert_eq!(log.read(2).unwrap().value, vec![2u8]);

    // One past it, the whole segment is strictly below and goes away.
    log.truncate(3).unwrap();
    assert_eq!(log.lowest_offset().unwrap(), 3);
    assert!(matches!(
        log.read(2).unwrap_err(),
        LogError::OffsetOutOfRange { offset: 2 }
    ));
}

#[derive(Debug, Default)]
struct CapturingListener {
    events: Mutex<Vec<LogEvent>>,
}

impl LogEventListener for CapturingListener {
    fn on_event(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[test]
fn test_rotation_emits_segment_rotated_event() {
    let dir = tempdir().unwrap();
    let listener = Arc::new(CapturingListener::default());
    let config = LogConfig {
        event_listener: listener.clone(),
        ..small_config()
    };

    let log = Log::open(dir.path(), config).unwrap();
    for i in 0..4u8 {
        log.append(&mut Record::new(vec![i])).unwrap();
    }

    let events = listener.events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, LogEvent::SegmentRotated { base_offset: 3 })));
}

#[test]
fn test_remove_deletes_directory() {
    let dir = tempdir().unwrap();
    let log_dir = dir.path().join("log");
    let log = Log::open(&log_dir, small_config()).unwrap();
    log.append(&mut Record::new(b"ephemeral".to_vec())).unwrap();

    log.remove().unwrap();
    assert!(!log_dir.exists());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_round_trip_arbitrary_payloads(
        payloads in vec(vec(any::<u8>(), 0..64), 1..40),
    ) {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            segment: SegmentConfig {
                max_store_bytes: 512,
                max_index_bytes: 8 * 12,
            },
            ..Default::default()
        };
        let log = Log::open(dir.path(), config).unwrap();

        let mut offsets = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            offsets.push(log.append(&mut Record::new(payload.clone())).unwrap());
        }

        // Offsets are dense and monotonically increasing from zero.
        for (i, offset) in offsets.iter().enumerate() {
            prop_assert_eq!(*offset, i as u64);
        }
        for (payload, offset) in payloads.iter().zip(&offsets) {
            prop_assert_eq!(&log.read(*offset).unwrap().value, payload);
        }
    }
}
