use codecell::sandbox::{DemuxError, OutputBuffers};

use super::FIXTURES_PATH;

fn capture(name: &str) -> Vec<u8> {
    let path = format!("{FIXTURES_PATH}/captures/{name}");
    std::fs::read(&path).unwrap_or_else(|e| panic!("Failed to read capture {path}: {e}"))
}

#[test]
fn test_mixed_capture_demultiplexes() {
    let buffers = OutputBuffers::from_raw(&capture("mixed.bin")).unwrap();

    let (stdout, stderr) = buffers.into_strings();
    assert_eq!(
        stdout,
        "Hello, World!\n__VIS__:{\"arr\":[2,1],\"i\":0,\"j\":1}\n"
    );
    assert_eq!(stderr, "warning: deprecated\n");
}

#[test]
fn test_truncated_capture_is_reported() {
    let result = OutputBuffers::from_raw(&capture("truncated.bin"));
    assert_eq!(result.unwrap_err(), DemuxError::Truncated(12));
}
