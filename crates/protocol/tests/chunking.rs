//! Chunk-size independence: the reader must produce the same frames no
//! matter how the byte stream is cut, including one byte at a time.

mod common;

use bytes::Bytes;
use common::{decode_chunks, encode_to_bytes};
use protocol::error::ProtocolError;
use protocol::frame::Frame;
use protocol::reader::Reader;

fn sample_frames() -> Vec<Frame> {
    vec![
        Frame::Timestamp { timestamp: 12_345 },
        Frame::KeyPressed {
            code: "test".to_owned(),
            alt_key: false,
            ctrl_key: false,
            meta_key: false,
            shift_key: false,
        },
    ]
}

#[tokio::test]
async fn one_byte_chunks_decode_in_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let frames = sample_frames();
    let bytes = encode_to_bytes(frames.clone(), 16).await;
    let chunks: Vec<Bytes> = bytes
        .iter()
        .map(|byte| Bytes::copy_from_slice(&[*byte]))
        .collect();
    let decoded = decode_chunks(chunks, false).await;
    assert_eq!(decoded, frames);
}

#[tokio::test]
async fn every_split_point_decodes_identically() {
    let frames = sample_frames();
    let bytes = encode_to_bytes(frames.clone(), 16).await;
    for split in 0..=bytes.len() {
        let chunks = vec![
            Bytes::copy_from_slice(&bytes[..split]),
            Bytes::copy_from_slice(&bytes[split..]),
        ];
        let decoded = decode_chunks(chunks, false).await;
        assert_eq!(decoded, frames, "split at {split}");
    }
}

#[tokio::test]
async fn writer_chunk_size_does_not_change_bytes() {
    let frames = sample_frames();
    let reference = encode_to_bytes(frames.clone(), 1).await;
    for chunk_size in [2, 3, 7, 64, 4096] {
        let bytes = encode_to_bytes(frames.clone(), chunk_size).await;
        assert_eq!(bytes, reference, "chunk size {chunk_size}");
    }
}

#[tokio::test]
async fn truncated_stream_errors_mid_frame() {
    let bytes = encode_to_bytes(sample_frames(), 16).await;
    let cut = bytes.len() - 3;
    let chunks = futures::stream::iter(vec![Bytes::copy_from_slice(&bytes[..cut])]);
    let mut reader = Reader::from_chunks(chunks, false);
    assert!(reader.next_frame().await.unwrap().is_some());
    assert!(matches!(
        reader.next_frame().await,
        Err(ProtocolError::UnexpectedEof)
    ));
}

#[tokio::test]
async fn header_prefixed_stream_parses_header_then_frames() {
    let frames = sample_frames();
    let (mut writer, mut stream) = protocol::writer::Writer::create(32);
    let produced = frames.clone();
    let producer = tokio::spawn(async move {
        writer.write_header(7_777).await.unwrap();
        for frame in produced {
            frame.encode(&mut writer).await.unwrap();
        }
        writer.close();
    });
    let mut bytes = Vec::new();
    while let Some(chunk) = tokio_stream::StreamExt::next(&mut stream).await {
        bytes.extend_from_slice(&chunk);
    }
    producer.await.unwrap();

    let chunks: Vec<Bytes> = bytes.chunks(5).map(Bytes::copy_from_slice).collect();
    let mut reader = Reader::from_chunks(futures::stream::iter(chunks), true);
    let mut decoded = Vec::new();
    while let Some(frame) = reader.next_frame().await.unwrap() {
        decoded.push(frame);
    }
    assert_eq!(decoded, frames);
    let header = reader.header().expect("header parsed");
    assert_eq!(header.created_at_ms, 7_777);
    assert_eq!(header.version, 1);
}
