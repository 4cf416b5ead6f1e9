//! Every decoder and encoder backing must agree on the bytes they see.

use bytes::Bytes;
use proptest::prelude::*;
use proptest::property_test;
use tagwire::decoder::{ArrayDecoder, BufDecoder, StreamDecoder};
use tagwire::encoder::{ArrayEncoder, BufEncoder, StreamEncoder};
use tagwire::{
    Config, Decoder, Encoder, Error, FieldDescriptor, MessageDescriptor, MessageMarshaller,
    ReadContext, Registry, Result, WireType, WriteContext,
};

#[derive(Debug, Clone, Default, PartialEq)]
struct Blob {
    label: String,
    chunks: Vec<Bytes>,
    counters: Vec<u64>,
}

struct BlobMarshaller;

impl MessageMarshaller for BlobMarshaller {
    type Target = Blob;

    fn type_name(&self) -> &str {
        "demo.Blob"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Blob> {
        Ok(Blob {
            label: ctx.read(1)?.unwrap_or_default(),
            chunks: ctx.read_repeated(2)?,
            counters: ctx.read_repeated(3)?,
        })
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &Blob) -> Result<()> {
        ctx.write(1, &value.label)?;
        ctx.write_repeated(2, &value.chunks)?;
        ctx.write_packed(3, &value.counters)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Envelope {
    blob: Option<Blob>,
}

struct EnvelopeMarshaller;

impl MessageMarshaller for EnvelopeMarshaller {
    type Target = Envelope;

    fn type_name(&self) -> &str {
        "demo.Envelope"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Envelope> {
        Ok(Envelope {
            blob: ctx.read_message(2)?,
        })
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &Envelope) -> Result<()> {
        ctx.write_message_opt(2, value.blob.as_ref())
    }
}

fn registry(config: Config) -> Registry {
    let registry = Registry::new(config);
    registry.register_message_descriptor(
        MessageDescriptor::builder("demo.Blob")
            .field(FieldDescriptor::new(1, "label", WireType::LengthDelimited))
            .field(FieldDescriptor::new(2, "chunks", WireType::LengthDelimited).repeated())
            .field(FieldDescriptor::new(3, "counters", WireType::Varint).repeated())
            .build()
            .unwrap(),
    );
    registry.register_message_descriptor(
        MessageDescriptor::builder("demo.Envelope")
            .field(FieldDescriptor::new(2, "blob", WireType::LengthDelimited))
            .build()
            .unwrap(),
    );
    registry.register_message_marshaller(BlobMarshaller).unwrap();
    registry.register_message_marshaller(EnvelopeMarshaller).unwrap();
    registry
}

fn small_buffers() -> Config {
    let mut config = Config::new();
    config.stream_buffer_size(0);
    config
}

fn large_blob() -> Blob {
    Blob {
        label: "x".repeat(1000),
        chunks: (0u8..20).map(|i| Bytes::from(vec![i; usize::from(i) * 7])).collect(),
        counters: (0..500).map(|i| 1u64 << (i % 64)).collect(),
    }
}

#[test]
fn test_decoders_agree_across_buffer_boundaries() {
    let registry = registry(small_buffers());
    let blob = large_blob();
    let bytes = registry.to_bytes(&blob).unwrap();

    assert_eq!(registry.from_slice::<Blob>(&bytes).unwrap(), blob);
    assert_eq!(registry.from_buf::<Blob, _>(Bytes::from(bytes.clone())).unwrap(), blob);
    assert_eq!(registry.from_buf::<Blob, _>(&bytes[..]).unwrap(), blob);
    assert_eq!(registry.from_reader::<Blob, _>(&bytes[..]).unwrap(), blob);
}

#[test]
fn test_stream_writer_matches_in_memory() {
    let registry = registry(small_buffers());
    let blob = large_blob();
    let expected = registry.to_bytes(&blob).unwrap();

    let mut streamed = Vec::new();
    registry.to_writer(&blob, &mut streamed).unwrap();
    assert_eq!(streamed, expected);

    let mut fixed = vec![0u8; expected.len()];
    let mut encoder = ArrayEncoder::new(&mut fixed);
    registry.write_to(&blob, &mut encoder, None).unwrap();
    assert_eq!(encoder.remaining(), 0);
    assert_eq!(fixed, expected);
}

#[test]
fn test_array_encoder_out_of_space() {
    let registry = registry(Config::new());
    let blob = large_blob();
    let mut fixed = vec![0u8; 64];
    let mut encoder = ArrayEncoder::new(&mut fixed);
    let err = registry.write_to(&blob, &mut encoder, None).unwrap_err();
    assert!(matches!(err, Error::OutOfSpace { .. }));
}

#[test]
fn test_truncated_input_on_every_backing() {
    let registry = registry(small_buffers());
    let bytes = registry.to_bytes(&large_blob()).unwrap();
    let cut = &bytes[..bytes.len() - 3];

    for err in [
        registry.from_slice::<Blob>(cut).unwrap_err(),
        registry.from_buf::<Blob, _>(cut).unwrap_err(),
        registry.from_reader::<Blob, _>(cut).unwrap_err(),
    ] {
        assert!(matches!(err, Error::MessageTruncated), "{err}");
    }

    // The nested frame declares 10 bytes but the input ends after 3.
    let short_frame = [0x12, 0x0A, 0x0A, 0x01, b'x'];
    for err in [
        registry.from_slice::<Envelope>(&short_frame).unwrap_err(),
        registry.from_buf::<Envelope, _>(&short_frame[..]).unwrap_err(),
        registry.from_reader::<Envelope, _>(&short_frame[..]).unwrap_err(),
    ] {
        assert!(matches!(err, Error::MessageTruncated), "{err}");
    }

    let whole = Envelope {
        blob: Some(Blob {
            label: "x".to_owned(),
            ..Blob::default()
        }),
    };
    let bytes = registry.to_bytes(&whole).unwrap();
    assert_eq!(registry.from_reader::<Envelope, _>(&bytes[..]).unwrap(), whole);
}

#[test]
fn test_stream_decoder_default_global_limit() {
    let mut config = Config::new();
    config.global_limit(Some(100));
    let registry = registry(config);
    let bytes = registry.to_bytes(&large_blob()).unwrap();
    let err = registry.from_reader::<Blob, _>(&bytes[..]).unwrap_err();
    assert!(matches!(err, Error::GlobalLimitExceeded { limit: 100 }));
}

#[property_test]
fn proptest_primitive_reads_agree(values: Vec<(u64, i32, String)>) {
    let mut data = Vec::new();
    let mut encoder = BufEncoder::new(&mut data);
    for (a, b, c) in &values {
        encoder.write_uint64_field(1, *a).unwrap();
        encoder.write_sint32_field(2, *b).unwrap();
        encoder.write_string_field(3, c).unwrap();
    }

    let mut streamed = Vec::new();
    let mut stream = StreamEncoder::with_capacity(&mut streamed, 32);
    for (a, b, c) in &values {
        stream.write_uint64_field(1, *a).unwrap();
        stream.write_sint32_field(2, *b).unwrap();
        stream.write_string_field(3, c).unwrap();
    }
    stream.flush().unwrap();
    drop(stream);
    prop_assert_eq!(&streamed, &data);

    let mut array = ArrayDecoder::new(&data);
    let mut buf = BufDecoder::new(Bytes::from(data.clone()));
    let mut stream = StreamDecoder::with_capacity(&data[..], 32);
    let decoders: [&mut dyn Decoder; 3] = [&mut array, &mut buf, &mut stream];
    for decoder in decoders {
        for (a, b, c) in &values {
            prop_assert_eq!(decoder.read_tag().unwrap(), 0x08);
            prop_assert_eq!(decoder.read_uint64().unwrap(), *a);
            prop_assert_eq!(decoder.read_tag().unwrap(), 0x10);
            prop_assert_eq!(decoder.read_sint32().unwrap(), *b);
            prop_assert_eq!(decoder.read_tag().unwrap(), 0x1A);
            prop_assert_eq!(&decoder.read_string().unwrap(), c);
        }
        prop_assert_eq!(decoder.read_tag().unwrap(), 0);
        prop_assert!(decoder.is_at_end().unwrap());
    }
}
