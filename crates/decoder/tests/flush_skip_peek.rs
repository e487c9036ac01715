mod common;

use common::{payload, Call, Harness, BASE_HEIGHT, BASE_WIDTH};
use lcevc_common::{DecoderError, EventKind, ReturnCode};
use lcevc_decoder::PeekResult;
use serde_json::json;

const TIMEOUT_US: u32 = 1_000_000;

fn parse_count(h: &Harness) -> usize {
    h.core
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Parse(_)))
        .count()
}

// -- Flush ------------------------------------------------------------------

#[test]
fn flush_drops_inputs_and_marks_results() {
    let h = Harness::new(json!({
        "loq_unprocessed_cap": 2,
        "events": [2, 6],
    }));

    let base = h.base_picture(0);
    let output = h.output_picture();
    h.registry
        .send_enhancement_data(h.decoder, 0, false, &payload(8, 8))
        .unwrap();
    h.registry
        .send_base_picture(h.decoder, 0, false, base, TIMEOUT_US, 0)
        .unwrap();
    h.registry.send_output_picture(h.decoder, output).unwrap();

    for ts in 1..3 {
        let pending = h.base_picture(0);
        h.registry
            .send_base_picture(h.decoder, ts, false, pending, TIMEOUT_US, 0)
            .unwrap();
    }
    h.registry
        .send_enhancement_data(h.decoder, 1, false, &payload(8, 8))
        .unwrap();

    h.registry.flush(h.decoder).unwrap();

    let stats = h.registry.stats(h.decoder).unwrap();
    assert_eq!(stats.base_queue, 0);
    assert_eq!(stats.unprocessed_enhancements, 0);
    assert_eq!(stats.results, 1);

    // Still receivable, but flushed and without memory.
    let result = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!(result.picture, output);
    assert_eq!(result.code, ReturnCode::Flushed);
    assert!(h
        .registry
        .get_picture_buffer_desc(h.decoder, output)
        .is_err());

    // Flushed bases are reported done but not queued for return.
    assert_eq!(h.registry.receive_finished_base_picture(h.decoder), Ok(base));
    assert_eq!(
        h.registry.receive_finished_base_picture(h.decoder),
        Err(DecoderError::Again)
    );

    assert_eq!(
        h.next_events(5),
        vec![
            EventKind::CanSendBase,
            EventKind::BasePictureDone,
            EventKind::BasePictureDone,
            EventKind::BasePictureDone,
            EventKind::CanSendBase,
        ]
    );
}

#[test]
fn flush_forgets_peeked_enhancement() {
    let h = Harness::new(json!({}));
    h.registry
        .send_enhancement_data(h.decoder, 5, false, &payload(8, 8))
        .unwrap();
    h.registry.peek(h.decoder, 5).unwrap();
    assert_eq!(h.registry.stats(h.decoder).unwrap().processed_enhancements, 1);

    h.registry.flush(h.decoder).unwrap();
    let stats = h.registry.stats(h.decoder).unwrap();
    assert_eq!(stats.unprocessed_enhancements, 0);
    assert_eq!(stats.processed_enhancements, 0);

    let base = h.base_picture(0);
    h.registry
        .send_base_picture(h.decoder, 5, false, base, TIMEOUT_US, 0)
        .unwrap();
    h.registry
        .send_output_picture(h.decoder, h.output_picture())
        .unwrap();
    let result = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!(result.code, ReturnCode::Success);
    assert!(!result.info.has_enhancement);
    assert!(!result.info.enhanced);
}

#[test]
fn decoding_resumes_after_flush() {
    let h = Harness::new(json!({}));

    let base = h.base_picture(0);
    h.registry
        .send_base_picture(h.decoder, 0, false, base, TIMEOUT_US, 0)
        .unwrap();
    h.registry.flush(h.decoder).unwrap();

    let base = h.base_picture(0);
    h.registry
        .send_enhancement_data(h.decoder, 1, false, &payload(8, 8))
        .unwrap();
    h.registry
        .send_base_picture(h.decoder, 1, false, base, TIMEOUT_US, 0)
        .unwrap();
    h.registry
        .send_output_picture(h.decoder, h.output_picture())
        .unwrap();

    let result = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!(result.code, ReturnCode::Success);
    assert_eq!(result.info.timestamp, 1);
    assert!(result.info.enhanced);
}

// -- Skip -------------------------------------------------------------------

#[test]
fn skip_finishes_bases_and_accumulates_enhancement() {
    let h = Harness::new(json!({}));

    let bases: Vec<_> = (0..3).map(|_| h.base_picture(0)).collect();
    for (ts, base) in bases.iter().enumerate() {
        let ts = ts as i64;
        h.registry
            .send_enhancement_data(h.decoder, ts, false, &payload(8, 8))
            .unwrap();
        h.registry
            .send_base_picture(h.decoder, ts, false, *base, TIMEOUT_US, 0)
            .unwrap();
    }

    h.registry.skip(h.decoder, 1).unwrap();
    assert_eq!(h.registry.stats(h.decoder).unwrap().base_queue, 1);
    assert_eq!(h.core.temporal_only_decodes(), 1);
    assert_eq!(parse_count(&h), 2);

    h.registry
        .send_output_picture(h.decoder, h.output_picture())
        .unwrap();
    let result = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!(result.info.timestamp, 2);
    assert!(result.info.enhanced);
    assert!(!result.info.skipped);

    for base in &bases {
        assert_eq!(h.registry.receive_finished_base_picture(h.decoder), Ok(*base));
    }
}

#[test]
fn skip_synthesizes_a_result_from_a_pending_output() {
    let h = Harness::new(json!({ "events": [5] }));

    let output = h.output_picture();
    h.registry.send_output_picture(h.decoder, output).unwrap();
    h.registry.skip(h.decoder, 5).unwrap();

    assert_eq!(h.next_events(1), vec![EventKind::CanReceive]);
    let result = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!(result.picture, output);
    assert_eq!(result.code, ReturnCode::Success);
    assert!(result.info.skipped);
    assert!(!result.info.has_base);
    assert_eq!(result.info.timestamp, 5);
    assert_eq!(h.registry.stats(h.decoder).unwrap().skipped, 1);
}

#[test]
fn skip_marks_queued_results_as_successful() {
    let h = Harness::new(json!({ "passthrough_mode": -1 }));

    for ts in 0..2 {
        let base = h.base_picture(0);
        h.registry
            .send_base_picture(h.decoder, ts, false, base, TIMEOUT_US, 0)
            .unwrap();
        h.registry
            .send_output_picture(h.decoder, h.output_picture())
            .unwrap();
    }

    h.registry.skip(h.decoder, 0).unwrap();

    let first = h.registry.receive_output_picture(h.decoder).unwrap();
    assert!(first.info.skipped);
    assert_eq!(first.code, ReturnCode::Success);
    let second = h.registry.receive_output_picture(h.decoder).unwrap();
    assert!(!second.info.skipped);
    assert_eq!(second.code, ReturnCode::Error);
    // A result existed for the boundary, so nothing was synthesized.
    assert_eq!(
        h.registry.receive_output_picture(h.decoder).unwrap_err(),
        DecoderError::Again
    );
}

#[test]
fn skip_orders_by_discontinuity_before_timestamp() {
    let h = Harness::new(json!({}));

    let base = h.base_picture(0);
    h.registry
        .send_base_picture(h.decoder, 100, false, base, TIMEOUT_US, 0)
        .unwrap();
    h.registry
        .send_output_picture(h.decoder, h.output_picture())
        .unwrap();
    let later = h.base_picture(0);
    h.registry
        .send_base_picture(h.decoder, 50, true, later, TIMEOUT_US, 0)
        .unwrap();

    // Skipping twice counts the result once.
    h.registry.skip(h.decoder, 50).unwrap();
    h.registry.skip(h.decoder, 50).unwrap();
    let stats = h.registry.stats(h.decoder).unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.base_queue, 0);

    let result = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!((result.cc, result.info.timestamp), (0, 100));
    assert!(result.info.skipped);
    assert_eq!(result.code, ReturnCode::Success);
}

#[test]
fn skip_in_a_new_segment_ignores_the_old_one() {
    let h = Harness::new(json!({}));

    let base = h.base_picture(0);
    h.registry
        .send_base_picture(h.decoder, 5, false, base, TIMEOUT_US, 0)
        .unwrap();
    let first = h.output_picture();
    h.registry.send_output_picture(h.decoder, first).unwrap();

    h.registry
        .send_enhancement_data(h.decoder, 5, true, &payload(8, 8))
        .unwrap();
    let second = h.output_picture();
    h.registry.send_output_picture(h.decoder, second).unwrap();
    h.registry.skip(h.decoder, 5).unwrap();

    // The old segment's result at the same timestamp does not stand in for
    // the new one, so a result is made from the pending output.
    let old = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!((old.picture, old.cc), (first, 0));
    assert!(old.info.skipped);
    let new = h.registry.receive_output_picture(h.decoder).unwrap();
    assert_eq!((new.picture, new.cc, new.info.timestamp), (second, 1, 5));
    assert!(new.info.skipped);
    assert_eq!(h.registry.stats(h.decoder).unwrap().skipped, 2);
}

// -- Peek -------------------------------------------------------------------

#[test]
fn peek_reports_finished_decodes() {
    let h = Harness::new(json!({}));

    let base = h.base_picture(0);
    h.registry
        .send_enhancement_data(h.decoder, 0, false, &payload(8, 8))
        .unwrap();
    h.registry
        .send_base_picture(h.decoder, 0, false, base, TIMEOUT_US, 0)
        .unwrap();
    h.registry
        .send_output_picture(h.decoder, h.output_picture())
        .unwrap();

    assert_eq!(
        h.registry.peek(h.decoder, 0),
        Ok(PeekResult {
            code: ReturnCode::Success,
            width: 8,
            height: 8,
        })
    );
}

#[test]
fn peek_parses_once_for_the_later_decode() {
    let h = Harness::new(json!({}));

    let base = h.base_picture(0);
    h.registry
        .send_enhancement_data(h.decoder, 0, false, &payload(16, 8))
        .unwrap();
    h.registry
        .send_base_picture(h.decoder, 0, false, base, TIMEOUT_US, 0)
        .unwrap();

    let peeked = h.registry.peek(h.decoder, 0).unwrap();
    assert_eq!((peeked.code, peeked.width, peeked.height), (ReturnCode::Success, 16, 8));
    assert_eq!(h.registry.stats(h.decoder).unwrap().processed_enhancements, 1);

    h.registry
        .send_output_picture(h.decoder, h.output_picture())
        .unwrap();
    let result = h.registry.receive_output_picture(h.decoder).unwrap();
    assert!(result.info.enhanced);
    assert_eq!(parse_count(&h), 1);
    assert_eq!(h.registry.stats(h.decoder).unwrap().processed_enhancements, 0);
}

#[test]
fn peek_without_base_uses_enhancement_size() {
    let h = Harness::new(json!({}));
    h.registry
        .send_enhancement_data(h.decoder, 4, false, &payload(32, 16))
        .unwrap();
    assert_eq!(
        h.registry.peek(h.decoder, 4),
        Ok(PeekResult {
            code: ReturnCode::Success,
            width: 32,
            height: 16,
        })
    );
}

#[test]
fn peek_passthrough_reports_base_size() {
    let h = Harness::new(json!({}));
    let base = h.base_picture(0);
    h.registry
        .send_base_picture(h.decoder, 0, false, base, TIMEOUT_US, 0)
        .unwrap();
    assert_eq!(
        h.registry.peek(h.decoder, 0),
        Ok(PeekResult {
            code: ReturnCode::Success,
            width: BASE_WIDTH,
            height: BASE_HEIGHT,
        })
    );
}

#[test]
fn peek_unknown_or_undecodable_is_not_found() {
    let h = Harness::new(json!({ "passthrough_mode": -1 }));
    assert_eq!(h.registry.peek(h.decoder, 0), Err(DecoderError::NotFound));

    let base = h.base_picture(0);
    h.registry
        .send_base_picture(h.decoder, 1, false, base, TIMEOUT_US, 0)
        .unwrap();
    assert_eq!(h.registry.peek(h.decoder, 1), Err(DecoderError::NotFound));
}
