//! DCX/DCP compression containers
//!
//! A DCX file is a big-endian header followed by one compressed payload:
//!
//! ```text
//! 0x00  "DCX\0"  unk04  0x18  0x24  unk10  unk14
//! 0x18  "DCS\0"  uncompressed_size  compressed_size
//! 0x24  "DCP\0"  codec tag  0x20  unk30 (u8 + pad)  0  unk38 (u8 + pad)  0  0x00010100
//! 0x44  "DCA\0"  8
//! 0x4C  payload
//! ```
//!
//! DFLT payloads are zlib streams, KRAK payloads are Oodle Kraken and ZSTD
//! payloads are Zstandard frames. Kraken can be read but not written.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::binary::{to_usize, Reader, Writer};
use crate::compression::{CompressionInfo, DfltParams};
use crate::{Error, Result};

const DCX_MAGIC: &[u8; 4] = b"DCX\0";
const DCP_MAGIC: &[u8; 4] = b"DCP\0";
const KRAK_UNK04: i32 = 0x11000;
const KRAK_UNK10: i32 = 0x44;
const KRAK_UNK14: i32 = 0x4C;
const ZSTD_LEVEL: i32 = 15;

/// Whether `bytes` begins with a DCX or DCP header
pub fn is_dcx(bytes: &[u8]) -> bool {
    bytes.starts_with(DCX_MAGIC) || bytes.starts_with(DCP_MAGIC)
}

fn is_zlib(bytes: &[u8]) -> bool {
    bytes.first() == Some(&0x78)
}

/// Decompress a DCX container, DCP container or bare zlib stream.
///
/// Data in none of those forms is returned unchanged as
/// [`CompressionInfo::Unknown`] so it survives a round trip.
pub fn decompress(bytes: &[u8]) -> Result<(Vec<u8>, CompressionInfo)> {
    if bytes.starts_with(DCX_MAGIC) {
        read_dcx(bytes)
    } else if bytes.starts_with(DCP_MAGIC) {
        read_dcp(bytes)
    } else if is_zlib(bytes) {
        Ok((inflate(bytes)?, CompressionInfo::Zlib))
    } else {
        Ok((bytes.to_vec(), CompressionInfo::Unknown))
    }
}

/// Compress `bytes` as described by `info`
pub fn compress(bytes: &[u8], info: &CompressionInfo) -> Result<Vec<u8>> {
    match info {
        CompressionInfo::None | CompressionInfo::Unknown => Ok(bytes.to_vec()),
        CompressionInfo::Zlib => deflate(bytes, 9),
        CompressionInfo::DcxDflt(params) => {
            let payload = deflate(bytes, params.unk30)?;
            write_dcx(bytes.len(), &payload, b"DFLT", params)
        }
        CompressionInfo::DcxZstd => {
            let payload = zstd::stream::encode_all(bytes, ZSTD_LEVEL)?;
            let params = DfltParams::new(KRAK_UNK04, KRAK_UNK10, KRAK_UNK14, 0, 0);
            write_dcx(bytes.len(), &payload, b"ZSTD", &params)
        }
        CompressionInfo::DcpDflt => write_dcp(bytes),
        CompressionInfo::DcxKrak { .. } => {
            Err(Error::UnsupportedCodec("DCX_KRAK compression".to_string()))
        }
        CompressionInfo::DcxEdge | CompressionInfo::DcpEdge => {
            Err(Error::UnsupportedCodec(info.tag().to_string()))
        }
    }
}

fn inflate(payload: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    ZlibDecoder::new(payload)
        .read_to_end(&mut output)
        .map_err(|e| Error::invalid(format!("zlib: {e}")))?;
    Ok(output)
}

fn deflate(bytes: &[u8], level: u8) -> Result<Vec<u8>> {
    let level = if level == 0 { 9 } else { u32::from(level.min(9)) };
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn kraken(payload: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut output = vec![0u8; size];
    let actual = oozextract::Extractor::new()
        .read_from_slice(payload, &mut output)
        .map_err(|e| Error::invalid(format!("oozextract: {e:?}")))?;
    if actual != size {
        return Err(Error::invalid(format!(
            "Kraken payload decompressed to {actual} bytes, expected {size}"
        )));
    }
    Ok(output)
}

fn check_size(data: Vec<u8>, expected: usize, codec: &str) -> Result<Vec<u8>> {
    if data.len() != expected {
        return Err(Error::invalid(format!(
            "{codec} payload decompressed to {} bytes, header says {expected}",
            data.len()
        )));
    }
    Ok(data)
}

fn read_dcx(bytes: &[u8]) -> Result<(Vec<u8>, CompressionInfo)> {
    let mut r = Reader::new(bytes);
    r.set_big_endian(true);
    r.expect_magic(DCX_MAGIC)?;
    let unk04 = r.i32()?;
    r.expect_i32(0x18, "DCS offset")?;
    r.expect_i32(0x24, "DCP offset")?;
    let unk10 = r.i32()?;
    let unk14 = r.i32()?;

    r.expect_magic(b"DCS\0")?;
    let uncompressed = to_usize(r.u32()?, "uncompressed size")?;
    let compressed = to_usize(r.u32()?, "compressed size")?;

    r.expect_magic(DCP_MAGIC)?;
    let mut tag = [0u8; 4];
    for byte in &mut tag {
        *byte = r.u8()?;
    }
    if &tag == b"EDGE" {
        return Err(Error::UnsupportedCodec("DCX_EDGE".to_string()));
    }
    r.expect_i32(0x20, "DCP header size")?;
    let unk30 = r.u8()?;
    r.skip(3 + 4)?;
    let unk38 = r.u8()?;
    r.skip(3 + 4)?;
    r.skip(4)?;
    r.expect_magic(b"DCA\0")?;
    let dca_size = to_usize(r.i32()?, "DCA size")?;
    // DCA size counts its own 8 header bytes
    let payload = r.slice_at(r.position() + dca_size.saturating_sub(8), compressed)?;

    match &tag {
        b"DFLT" => {
            let params = DfltParams {
                unk04,
                unk10,
                unk14,
                unk30,
                unk38,
            };
            let data = check_size(inflate(payload)?, uncompressed, "DFLT")?;
            Ok((data, CompressionInfo::DcxDflt(params)))
        }
        b"KRAK" => Ok((
            kraken(payload, uncompressed)?,
            CompressionInfo::DcxKrak { level: unk30 },
        )),
        b"ZSTD" => {
            let data = check_size(zstd::stream::decode_all(payload)?, uncompressed, "ZSTD")?;
            Ok((data, CompressionInfo::DcxZstd))
        }
        other => Err(Error::UnsupportedCompressionType(format!(
            "DCX_{}",
            String::from_utf8_lossy(other).trim_end_matches('\0')
        ))),
    }
}

fn size_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::invalid("payload exceeds 4 GiB"))
}

fn write_dcx(
    uncompressed: usize,
    payload: &[u8],
    tag: &[u8; 4],
    params: &DfltParams,
) -> Result<Vec<u8>> {
    let mut w = Writer::new(true);
    w.bytes(DCX_MAGIC);
    w.i32(params.unk04);
    w.i32(0x18);
    w.i32(0x24);
    w.i32(params.unk10);
    w.i32(params.unk14);
    w.bytes(b"DCS\0");
    w.u32(size_u32(uncompressed)?);
    w.u32(size_u32(payload.len())?);
    w.bytes(DCP_MAGIC);
    w.bytes(tag);
    w.i32(0x20);
    w.u8(params.unk30);
    w.zeros(3);
    w.i32(0);
    w.u8(params.unk38);
    w.zeros(3);
    w.i32(0);
    w.i32(0x0001_0100);
    w.bytes(b"DCA\0");
    w.i32(8);
    w.bytes(payload);
    Ok(w.into_inner())
}

fn read_dcp(bytes: &[u8]) -> Result<(Vec<u8>, CompressionInfo)> {
    let mut r = Reader::new(bytes);
    r.set_big_endian(true);
    r.expect_magic(DCP_MAGIC)?;
    let mut tag = [0u8; 4];
    for byte in &mut tag {
        *byte = r.u8()?;
    }
    match &tag {
        b"DFLT" => {}
        b"EDGE" => return Err(Error::UnsupportedCodec("DCP_EDGE".to_string())),
        other => {
            return Err(Error::UnsupportedCompressionType(format!(
                "DCP_{}",
                String::from_utf8_lossy(other)
            )))
        }
    }
    r.expect_i32(0x20, "DCP header size")?;
    r.expect_i32(0x0900_0000, "DCP level")?;
    r.skip(12)?;
    r.expect_i32(0x0001_0100, "DCP unk")?;
    r.expect_magic(b"DCS\0")?;
    let uncompressed = to_usize(r.u32()?, "uncompressed size")?;
    let compressed = to_usize(r.u32()?, "compressed size")?;
    let payload = r.slice_at(r.position(), compressed)?;
    let data = check_size(inflate(payload)?, uncompressed, "DCP_DFLT")?;
    Ok((data, CompressionInfo::DcpDflt))
}

fn write_dcp(bytes: &[u8]) -> Result<Vec<u8>> {
    let payload = deflate(bytes, 9)?;
    let mut w = Writer::new(true);
    w.bytes(DCP_MAGIC);
    w.bytes(b"DFLT");
    w.i32(0x20);
    w.i32(0x0900_0000);
    w.zeros(12);
    w.i32(0x0001_0100);
    w.bytes(b"DCS\0");
    w.u32(size_u32(bytes.len())?);
    w.u32(size_u32(payload.len())?);
    w.bytes(&payload);
    w.bytes(b"DCA\0");
    w.i32(8);
    Ok(w.into_inner())
}
