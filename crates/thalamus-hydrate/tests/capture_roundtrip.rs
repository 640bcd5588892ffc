//! End-to-end `CaptureWriter` -> `CaptureReader` roundtrip across multiple
//! nodes of both kinds in the same file, exercised through the crate's
//! public API the way `thalamus-rpc`'s `Replay` handler consumes it.

use thalamus_hydrate::{AnalogNodeBuffer, CaptureReader, CaptureWriter, MotionNodeBuffer};

#[test]
fn roundtrips_analog_and_motion_nodes_together() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.h5");
    let path_str = path.to_str().unwrap();

    let mut eeg = AnalogNodeBuffer {
        channel_names: vec!["Fz".to_string(), "Cz".to_string()],
        channel_count: 2,
        ..Default::default()
    };
    eeg.push_slab(&[1.0, 2.0, 3.0, 4.0], 1_000_000, 1_000_050);
    eeg.push_slab(&[5.0, 6.0], 2_000_000, 2_000_050);

    let mut mocap = MotionNodeBuffer { segment_names: vec!["pelvis".to_string()], ..Default::default() };
    mocap.push_frame(&[0.0, 0.1, 0.2], &[1.0, 0.0, 0.0, 0.0], 1_500_000, 1_500_010);
    mocap.push_frame(&[0.0, 0.2, 0.4], &[1.0, 0.0, 0.0, 0.0], 1_600_000, 1_600_010);

    let writer = CaptureWriter::create(path_str, Some(4)).unwrap();
    writer.write_analog_node("eeg", &eeg).unwrap();
    writer.write_motion_node("mocap", &mocap).unwrap();
    drop(writer);

    let reader = CaptureReader::open(path_str).unwrap();

    assert_eq!(reader.nodes.len(), 1);
    let (name, read_eeg) = &reader.nodes[0];
    assert_eq!(name, "eeg");
    assert_eq!(read_eeg.samples, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(read_eeg.channel_names, vec!["Fz", "Cz"]);
    assert_eq!(read_eeg.index.len(), 2);
    assert_eq!(read_eeg.index[0].time_ns, 1_000_000);
    assert_eq!(read_eeg.index[0].cumulative_sample_count, 4);
    assert_eq!(read_eeg.index[1].time_ns, 2_000_000);
    assert_eq!(read_eeg.index[1].cumulative_sample_count, 6);
    assert_eq!(read_eeg.index[1].remote_time_ns, 2_000_050);

    assert_eq!(reader.motion_nodes.len(), 1);
    let (name, read_mocap) = &reader.motion_nodes[0];
    assert_eq!(name, "mocap");
    assert_eq!(read_mocap.segment_names, vec!["pelvis"]);
    assert_eq!(read_mocap.positions, vec![0.0, 0.1, 0.2, 0.0, 0.2, 0.4]);
    assert_eq!(read_mocap.rotations.len(), 8);
    assert_eq!(read_mocap.index.len(), 2);
    assert_eq!(read_mocap.index[0].cumulative_sample_count, 1);
    assert_eq!(read_mocap.index[1].cumulative_sample_count, 2);
}

#[test]
fn empty_capture_round_trips_with_no_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.h5");
    let path_str = path.to_str().unwrap();

    let writer = CaptureWriter::create(path_str, None).unwrap();
    drop(writer);

    let reader = CaptureReader::open(path_str).unwrap();
    assert!(reader.nodes.is_empty());
    assert!(reader.motion_nodes.is_empty());
}
