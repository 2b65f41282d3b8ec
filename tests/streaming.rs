use std::io::{Cursor, Write};

use anyhow::Result;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use rand::{rngs::StdRng, Rng, SeedableRng};

use ripflate::{
    adler32, compress, crc32, decompress, ChecksumKind, DecoderOptions, DeflateReader,
    Destination, Format, InflateError, Source, Status, ADLER32_INIT, CRC32_INIT, HISTORY_SIZE,
};

fn payloads() -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(2023);
    let mut noise = vec![0u8; 40_000];
    rng.fill(noise.as_mut_slice());
    let mut mixed = Vec::new();
    while mixed.len() < 200_000 {
        let len = rng.gen_range(1..400);
        if rng.gen_bool(0.5) && mixed.len() > 40_000 {
            let start = rng.gen_range(mixed.len() - 40_000..mixed.len() - len.min(40_000));
            let copy = mixed[start..start + len].to_vec();
            mixed.extend(copy);
        } else {
            mixed.extend((0..len).map(|_| rng.gen_range(b'a'..=b'f')));
        }
    }
    vec![
        Vec::new(),
        b"a".to_vec(),
        b"abc".repeat(1000),
        noise,
        mixed,
        vec![0u8; 300_000],
    ]
}

#[test]
fn round_trip_through_every_format() -> Result<()> {
    for data in payloads() {
        for format in [Format::Raw, Format::Zlib, Format::Gzip] {
            let compressed = compress(&data, format)?;
            let mut out = Vec::new();
            let written = decompress(compressed.as_slice(), &mut out, format)?;
            assert_eq!(written, data.len() as u64);
            assert_eq!(out, data);
        }
    }
    Ok(())
}

#[test]
fn flate2_streams_decode() -> Result<()> {
    for data in payloads() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&data)?;
        let zlib = encoder.finish()?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(3));
        encoder.write_all(&data)?;
        let gzip = encoder.finish()?;

        let mut out = Vec::new();
        decompress(zlib.as_slice(), &mut out, Format::Zlib)?;
        assert_eq!(out, data);

        let mut out = Vec::new();
        decompress(gzip.as_slice(), &mut out, Format::Gzip)?;
        assert_eq!(out, data);
    }
    Ok(())
}

#[test]
fn every_destination_agrees() -> Result<()> {
    let data = payloads().swap_remove(4);
    let compressed = compress(&data, Format::Gzip)?;
    let expected_crc = !crc32(&data, CRC32_INIT);

    let mut reader = DeflateReader::new(
        Source::resident(&compressed),
        Destination::buffer(),
        DecoderOptions::new(),
    );
    reader.parse_gzip_header()?;
    assert_eq!(reader.decode_step(usize::MAX)?, Status::Done(data.len()));
    assert_eq!(reader.output(), data.as_slice());
    assert_eq!(reader.current_checksum(), expected_crc);

    let mut out = Vec::new();
    {
        let mut reader = DeflateReader::new(
            Source::reader(compressed.as_slice()),
            Destination::writer(&mut out),
            DecoderOptions::new().dictionary_size(HISTORY_SIZE),
        );
        reader.parse_gzip_header()?;
        while let Status::More(_) = reader.decode_step(777)? {}
        assert_eq!(reader.current_checksum(), expected_crc);
    }
    assert_eq!(out, data);

    let mut out = Vec::new();
    {
        let mut reader = DeflateReader::new(
            Source::resident(&compressed),
            Destination::seekable(Cursor::new(&mut out)),
            DecoderOptions::new(),
        );
        reader.parse_gzip_header()?;
        while let Status::More(_) = reader.decode_step(1)? {}
        assert_eq!(reader.current_checksum(), expected_crc);
    }
    assert_eq!(out, data);
    Ok(())
}

#[test]
fn raw_stream_with_requested_checksum() -> Result<()> {
    let data = b"The quick brown fox jumps over the lazy dog. ".repeat(50);
    let compressed = compress(&data, Format::Raw)?;
    for (kind, expected) in [
        (ChecksumKind::None, 0),
        (ChecksumKind::Adler32, adler32(&data, ADLER32_INIT)),
        (ChecksumKind::Crc32, !crc32(&data, CRC32_INIT)),
    ] {
        let mut reader = DeflateReader::new(
            Source::resident(&compressed),
            Destination::buffer(),
            DecoderOptions::new().checksum(kind),
        );
        let mut out = Vec::new();
        loop {
            let status = reader.decode_step(100)?;
            out.extend(reader.take_output());
            if let Status::Done(_) = status {
                break;
            }
        }
        assert_eq!(out, data);
        assert_eq!(reader.current_checksum(), expected);
        assert_eq!(reader.source_position(), Some(compressed.len()));
    }
    Ok(())
}

#[test]
fn corrupt_streams_are_reported() -> Result<()> {
    let data = b"corruption ".repeat(100);
    let mut compressed = compress(&data, Format::Zlib)?;
    let last = compressed.len() - 1;
    compressed[last] ^= 1;

    let mut out = Vec::new();
    let err = decompress(compressed.as_slice(), &mut out, Format::Zlib).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InflateError>(),
        Some(InflateError::Checksum { .. })
    ));
    assert_eq!(out, data);

    let err = decompress(&b"\x1f\x8c\x08"[..], Vec::new(), Format::Gzip).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InflateError>(),
        Some(InflateError::BadHeader(_))
    ));

    let err = decompress(&b"\x07"[..], Vec::new(), Format::Raw).unwrap_err();
    assert!(err
        .downcast_ref::<InflateError>()
        .map_or(false, InflateError::is_data_error));
    Ok(())
}
