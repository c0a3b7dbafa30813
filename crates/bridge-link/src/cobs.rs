//! Byte-stuffing codec (spec §4.1): a COBS-like encoding that removes
//! every `0x00` from a buffer so the single trailing `0x00` can be used
//! as an unambiguous frame delimiter, with self-synchronization — a lost
//! or extra delimiter resynchronizes within at most one frame.

use crate::consts::FRAME_DELIMITER;
use crate::error::CobsError;

/// Maximum run length a single stuffing code byte can cover.
const MAX_RUN: usize = 254;

/// Encodes `input` into `out`, appending the trailing delimiter.
/// Returns the number of bytes written (including the delimiter).
///
/// `out` must be at least `max_encoded_len(input.len())` bytes.
pub fn encode(input: &[u8], out: &mut [u8]) -> Result<usize, CobsError> {
    if out.len() < max_encoded_len(input.len()) {
        return Err(CobsError::BufferTooSmall);
    }

    let mut out_idx = 0usize;
    let mut code_idx = 0usize;
    let mut code: u8 = 1;
    out[0] = 0; // placeholder, patched once the run length is known
    out_idx += 1;

    for &byte in input {
        if byte == FRAME_DELIMITER {
            out[code_idx] = code;
            code_idx = out_idx;
            out[out_idx] = 0;
            out_idx += 1;
            code = 1;
        } else {
            out[out_idx] = byte;
            out_idx += 1;
            code += 1;
            if code as usize == MAX_RUN + 1 {
                out[code_idx] = code;
                code_idx = out_idx;
                out[out_idx] = 0;
                out_idx += 1;
                code = 1;
            }
        }
    }

    out[code_idx] = code;
    out[out_idx] = FRAME_DELIMITER;
    out_idx += 1;

    Ok(out_idx)
}

/// Decodes a delimited, stuffed `input` (the trailing delimiter may or
/// may not be included) into `out`. Returns the decoded length.
pub fn decode(input: &[u8], out: &mut [u8], max_decoded_len: usize) -> Result<usize, CobsError> {
    let input = match input.last() {
        Some(&FRAME_DELIMITER) => &input[..input.len() - 1],
        _ => input,
    };

    let mut in_idx = 0usize;
    let mut out_idx = 0usize;

    while in_idx < input.len() {
        let code = input[in_idx] as usize;
        if code == 0 {
            return Err(CobsError::DecodeError);
        }
        in_idx += 1;

        let run = code - 1;
        if in_idx + run > input.len() {
            return Err(CobsError::DecodeError);
        }
        if out_idx + run > max_decoded_len {
            return Err(CobsError::Overflow);
        }
        out[out_idx..out_idx + run].copy_from_slice(&input[in_idx..in_idx + run]);
        out_idx += run;
        in_idx += run;

        if code <= MAX_RUN && in_idx < input.len() {
            if out_idx >= max_decoded_len {
                return Err(CobsError::Overflow);
            }
            out[out_idx] = FRAME_DELIMITER;
            out_idx += 1;
        }
    }

    // The implicit trailing zero inserted above after every
    // non-maximal-run code is one byte too many whenever the very last
    // code in the stream happened to be non-maximal; the loop above
    // already avoids emitting it past the end by only inserting it
    // between codes (`in_idx < input.len()`), so no further trim is
    // needed here.
    Ok(out_idx)
}

/// Worst-case encoded length for an `n`-byte input: `ceil(n/254) + 1`
/// extra bytes (code bytes) plus the trailing delimiter (spec §4.1).
pub const fn max_encoded_len(n: usize) -> usize {
    n + n.div_ceil(MAX_RUN) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(input: &[u8]) {
        let mut enc = [0u8; 2048];
        let enc_len = encode(input, &mut enc).unwrap();
        assert!(!enc[..enc_len - 1].contains(&FRAME_DELIMITER));
        assert_eq!(enc[enc_len - 1], FRAME_DELIMITER);

        let mut dec = [0u8; 2048];
        let dec_len = decode(&enc[..enc_len], &mut dec, dec.len()).unwrap();
        assert_eq!(&dec[..dec_len], input);
    }

    #[test]
    fn roundtrip_empty() {
        roundtrip(&[]);
    }

    #[test]
    fn roundtrip_no_zeros() {
        roundtrip(b"hello, world");
    }

    #[test]
    fn roundtrip_with_zeros() {
        roundtrip(&[0, 1, 0, 0, 2, 3, 0]);
    }

    #[test]
    fn roundtrip_long_run_without_zero() {
        let input = [0x41u8; 600];
        roundtrip(&input);
    }

    #[test]
    fn roundtrip_all_zeros() {
        let input = [0u8; 10];
        roundtrip(&input);
    }

    #[test]
    fn decode_rejects_run_claim_past_end() {
        let mut out = [0u8; 16];
        // Code byte claims a 10-byte run but only 2 bytes follow.
        let bogus = [11u8, 1, 2];
        assert!(matches!(
            decode(&bogus, &mut out, out.len()),
            Err(CobsError::DecodeError)
        ));
    }

    #[test]
    fn decode_rejects_oversized_output() {
        let mut enc = [0u8; 2048];
        let input = [0x41u8; 300];
        let enc_len = encode(&input, &mut enc).unwrap();
        let mut out = [0u8; 10];
        assert!(matches!(
            decode(&enc[..enc_len], &mut out, out.len()),
            Err(CobsError::Overflow)
        ));
    }
}
