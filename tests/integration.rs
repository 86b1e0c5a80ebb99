// Integration tests for canmon_lib
//
// Drive the stream processor the way the terminal front end does: bytes in
// arbitrary chunks, requests through a sink, views through filters.

use std::sync::mpsc;

use canmon_lib::{
    Direction, Disconnected, FrameFilter, MonitorEvent, ProcessorConfig, RequestCatalog,
    RequestError, StreamProcessor, SubmitOutcome,
};

const BRIDGE_OUTPUT: &[u8] = b"CAN bridge ready\r\n\
[ID 0x1900140] 0A 1B 2C 3D\r\n\
[ID 0x18ff50e5]temp 25C\r\n\
\r\n\
[ID 0x1910140]\r\n\
[ID 0x7DF broken\r\n\
[ID 0x1920140]min 21 max 34\r\n";

fn ids(processor: &StreamProcessor<mpsc::Sender<MonitorEvent>>, filter: &FrameFilter) -> Vec<String> {
    processor.current_view(filter).into_iter().map(|f| f.id).collect()
}

#[test]
fn test_bridge_stream_any_chunking() {
    for chunk_size in [1, 2, 3, 7, 16, 64, BRIDGE_OUTPUT.len()] {
        let (tx, rx) = mpsc::channel();
        let mut processor = StreamProcessor::new(ProcessorConfig::default(), tx);

        let mut batches = 0;
        for chunk in BRIDGE_OUTPUT.chunks(chunk_size) {
            processor.on_bytes_received(chunk);
            batches += 1;
        }

        assert_eq!(
            ids(&processor, &FrameFilter::disabled()),
            vec!["0X1920140", "0X1910140", "0X18FF50E5", "0X1900140"],
            "chunk size {}",
            chunk_size
        );

        let notifications = rx
            .try_iter()
            .filter(|e| matches!(e, MonitorEvent::HistoryChanged { .. }))
            .count();
        assert_eq!(notifications, batches);

        let stats = processor.stats();
        assert_eq!(stats.records_parsed, 4);
        assert_eq!(stats.rejected_unrecognized, 1);
        assert_eq!(stats.rejected_empty, 1);
        assert_eq!(stats.rejected_malformed_id, 1);
        assert_eq!(stats.bytes_received, BRIDGE_OUTPUT.len() as u64);
    }
}

#[test]
fn test_payloads_and_lengths() {
    let (tx, _rx) = mpsc::channel();
    let mut processor = StreamProcessor::new(ProcessorConfig::default(), tx);
    processor.on_bytes_received(BRIDGE_OUTPUT);

    let view = processor.current_view(&FrameFilter::disabled());
    assert_eq!(view[0].payload, "min 21 max 34");
    assert_eq!(view[1].payload, "No data");
    assert_eq!(view[1].length, 7);
    assert_eq!(view[2].payload, "temp 25C");
    assert_eq!(view[3].payload, "0A 1B 2C 3D");
    assert!(view.iter().all(|f| f.direction == Direction::Inbound));
    assert!(view.iter().all(|f| f.length_label() == "N/A"));
}

#[test]
fn test_requests_and_filtering() {
    let (tx, _rx) = mpsc::channel();
    let mut processor = StreamProcessor::new(ProcessorConfig::default(), tx);
    let catalog = RequestCatalog::default();
    let mut wire: Vec<u8> = Vec::new();

    processor.on_bytes_received(BRIDGE_OUTPUT);

    let id = catalog.resolve("1").unwrap();
    assert_eq!(processor.submit_request(id, &mut wire), Ok(SubmitOutcome::Sent));
    let id = catalog.resolve("Max/Min Cell Voltages").unwrap();
    assert_eq!(
        processor.submit_request(id, &mut Disconnected),
        Ok(SubmitOutcome::NotWritable)
    );
    let none = catalog.resolve("0").unwrap();
    assert_eq!(
        processor.submit_request(none, &mut wire),
        Err(RequestError::NoRequestSelected)
    );

    // Only the written request reached the wire
    assert_eq!(wire, vec![0x01, 0x90, 0x01, 0x40]);

    let all = processor.current_view(&FrameFilter::disabled());
    assert_eq!(all.len(), 6);
    assert_eq!(all[0].id, "0x1910140");
    assert_eq!(all[0].direction, Direction::Outbound);
    assert_eq!(all[0].length_label(), "8");

    // Outbound ids keep a lowercase x, inbound ids are fully upper-cased;
    // the filter is case-insensitive so both match
    assert_eq!(
        ids(&processor, &FrameFilter::id_contains("0x1900140")),
        vec!["0x1900140", "0X1900140"]
    );
    assert_eq!(ids(&processor, &FrameFilter::id_contains("50e5")), vec!["0X18FF50E5"]);

    processor.clear();
    assert!(processor.current_view(&FrameFilter::disabled()).is_empty());
}

#[test]
fn test_history_bounded_at_fifty() {
    let (tx, _rx) = mpsc::channel();
    let mut processor = StreamProcessor::new(ProcessorConfig::default(), tx);

    let stream: Vec<u8> = (0..55)
        .flat_map(|i| format!("[ID 0x{:X}]frame {}\n", i, i).into_bytes())
        .collect();
    processor.on_bytes_received(&stream);

    let view = processor.current_view(&FrameFilter::disabled());
    assert_eq!(view.len(), 50);
    assert_eq!(view[0].payload, "frame 54");
    assert_eq!(view[49].payload, "frame 5");
}
