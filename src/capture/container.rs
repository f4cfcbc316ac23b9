use super::CaptureError;

/// Anything smaller than this is an MP4 shell with no frames in it.
pub const MIN_CONTAINER_BYTES: usize = 2048;

/// Cheap signature check: an MP4 starts with an `ftyp` box, or with
/// `moov`/`mdat` when written by some muxers.
pub fn looks_like_mp4(bytes: &[u8]) -> bool {
    const TAGS: [&[u8]; 3] = [b"ftyp", b"moov", b"mdat"];
    let header = &bytes[..bytes.len().min(12)];
    TAGS.iter()
        .any(|tag| header.windows(4).any(|window| window == *tag))
}

pub fn check_min_size(bytes: &[u8]) -> Result<(), CaptureError> {
    if bytes.len() < MIN_CONTAINER_BYTES {
        return Err(CaptureError::EmptyCapture(format!(
            "ffmpeg captured no frames ({} bytes, likely an empty MP4 container)",
            bytes.len()
        )));
    }
    Ok(())
}

/// Hex of the first 12 bytes, for log lines.
pub fn header_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(12)
        .map(|b| format!("{b:02x}"))
        .collect()
}
