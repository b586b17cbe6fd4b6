//! Golden byte fixtures. Run with `DCRR_BLESS=1` to re-bless the
//! expected outputs after an intentional format change.

mod common;

use std::fs;
use std::path::PathBuf;

use common::encode_to_bytes;
use protocol::frame::Frame;
use tokio_stream::StreamExt as _;

fn golden_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/golden")
        .join(name)
}

fn check_golden(name: &str, actual: &[u8]) {
    let path = golden_path(name);
    if std::env::var_os("DCRR_BLESS").is_some() {
        fs::write(&path, actual).expect("bless golden file");
        return;
    }
    let expected = fs::read(&path).expect("read golden file");
    assert_eq!(actual, expected, "golden mismatch for {name}");
}

#[tokio::test]
async fn timestamp_frame_is_twelve_bytes() {
    let bytes = encode_to_bytes(vec![Frame::Timestamp { timestamp: 1_234_567_890 }], 64).await;
    assert_eq!(bytes.len(), 12);
    assert_eq!(&bytes[..4], &[0, 0, 0, 0]);
    assert_eq!(&bytes[4..], &1_234_567_890u64.to_be_bytes());
    check_golden("timestamp.bin", &bytes);
}

#[tokio::test]
async fn file_header_bytes_are_stable() {
    let (mut writer, mut stream) = protocol::writer::Writer::create(64);
    writer.write_header(1_691_234_567_890).await.unwrap();
    writer.close();
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk);
    }
    assert_eq!(bytes.len(), 32);
    check_golden("header.bin", &bytes);
}
