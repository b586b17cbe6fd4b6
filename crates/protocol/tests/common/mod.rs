// Not every integration test uses every helper.
#![allow(dead_code)]

use bytes::Bytes;
use protocol::frame::Frame;
use protocol::reader::Reader;
use protocol::writer::Writer;
use tokio_stream::StreamExt as _;

/// Encode frames on a spawned task and collect the raw byte output.
pub async fn encode_to_bytes(frames: Vec<Frame>, chunk_size: usize) -> Vec<u8> {
    let (mut writer, mut stream) = Writer::create(chunk_size);
    let producer = tokio::spawn(async move {
        for frame in frames {
            frame.encode(&mut writer).await.expect("encode");
        }
        writer.close();
    });
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk);
    }
    producer.await.expect("producer task");
    bytes
}

/// Feed pre-chunked bytes into a reader and collect every frame.
pub async fn decode_chunks(chunks: Vec<Bytes>, expect_header: bool) -> Vec<Frame> {
    let mut reader = Reader::from_chunks(futures::stream::iter(chunks), expect_header);
    let mut frames = Vec::new();
    while let Some(frame) = reader.next_frame().await.expect("decode") {
        frames.push(frame);
    }
    frames
}

/// Encode then decode through a single whole-buffer chunk.
pub async fn roundtrip(frames: Vec<Frame>) -> Vec<Frame> {
    let bytes = encode_to_bytes(frames, 64).await;
    decode_chunks(vec![Bytes::from(bytes)], false).await
}
