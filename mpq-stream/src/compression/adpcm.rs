//! ADPCM audio codec for sector payloads.
//!
//! Samples are 16-bit little-endian, stereo channels interleaved. The
//! compressed stream opens with a reserved byte and the quantizer bit
//! shift, then each channel's initial predictor verbatim. Every following
//! byte either steps the predictor (sign bit 0x40, six magnitude bits) or
//! escapes through the 0x80 control range to adjust the step index.

use crate::error::{Error, Result};

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

const INITIAL_STEP_INDEX: i32 = 44;
const MAX_STEP_INDEX: i32 = 88;

/// Quantizer shift written by [`compress`].
const BIT_SHIFT: u32 = 2;

fn index_adjust(magnitude: u8) -> i32 {
    if magnitude == 0 {
        -1
    } else {
        magnitude.ilog2() as i32
    }
}

fn reconstruct(code: u8, step: i32, shift: u32) -> i32 {
    let mut diff = step >> shift;
    for bit in 0..6 {
        if code & (1 << bit) != 0 {
            diff += step >> bit;
        }
    }
    diff
}

/// Decompress an ADPCM stream into 16-bit little-endian samples.
pub fn decompress(data: &[u8], channels: usize) -> Result<Vec<u8>> {
    let header = 2 + 2 * channels;
    if data.len() < header {
        return Err(Error::TruncatedData {
            expected: header,
            actual: data.len(),
        });
    }

    let shift = u32::from(data[1]);
    let mut predictor = [0i32; 2];
    let mut step_index = [INITIAL_STEP_INDEX; 2];
    let mut output = Vec::new();

    for ch in 0..channels {
        let sample = i16::from_le_bytes([data[2 + 2 * ch], data[3 + 2 * ch]]);
        predictor[ch] = i32::from(sample);
        output.extend_from_slice(&sample.to_le_bytes());
    }

    let mut ch = 0;
    let advance = |ch: &mut usize| *ch = (*ch + 1) % channels;

    for &code in &data[header..] {
        if code & 0x80 != 0 {
            match code & 0x7F {
                0 => {
                    // Repeat the previous sample at a smaller step.
                    if step_index[ch] > 0 {
                        step_index[ch] -= 1;
                    }
                    output.extend_from_slice(&(predictor[ch] as i16).to_le_bytes());
                    advance(&mut ch);
                }
                1 => {
                    step_index[ch] = (step_index[ch] + 8).min(MAX_STEP_INDEX);
                }
                2 => {
                    advance(&mut ch);
                }
                _ => {
                    step_index[ch] = (step_index[ch] - 8).max(0);
                }
            }
        } else {
            let step = STEP_TABLE[step_index[ch] as usize];
            let diff = reconstruct(code, step, shift);

            predictor[ch] = if code & 0x40 != 0 {
                predictor[ch] - diff
            } else {
                predictor[ch] + diff
            }
            .clamp(i32::from(i16::MIN), i32::from(i16::MAX));

            output.extend_from_slice(&(predictor[ch] as i16).to_le_bytes());
            step_index[ch] =
                (step_index[ch] + index_adjust(code & 0x3F)).clamp(0, MAX_STEP_INDEX);
            advance(&mut ch);
        }
    }

    Ok(output)
}

/// Compress 16-bit little-endian samples.
///
/// Lossy: the decoder reproduces the same sample count with quantization
/// error bounded by the step table. Each channel's first sample is stored
/// verbatim.
pub fn compress(data: &[u8], channels: usize) -> Result<Vec<u8>> {
    if data.len() % 2 != 0 || (data.len() / 2) % channels != 0 {
        return Err(Error::CorruptData(format!(
            "sample stream of {} bytes does not divide into {channels}-channel frames",
            data.len()
        )));
    }

    let samples: Vec<i16> = data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if samples.len() < channels {
        return Err(Error::TruncatedData {
            expected: 2 * channels,
            actual: data.len(),
        });
    }

    let mut output = vec![0u8, BIT_SHIFT as u8];
    let mut predictor = [0i32; 2];
    let mut step_index = [INITIAL_STEP_INDEX; 2];

    for ch in 0..channels {
        predictor[ch] = i32::from(samples[ch]);
        output.extend_from_slice(&samples[ch].to_le_bytes());
    }

    let mut ch = 0;
    for &sample in &samples[channels..] {
        let step = STEP_TABLE[step_index[ch] as usize];
        let target = i32::from(sample) - predictor[ch];

        let mut code: u8 = if target < 0 { 0x40 } else { 0 };
        let mut remaining = target.abs() - (step >> BIT_SHIFT);
        for bit in 0..6 {
            let piece = step >> bit;
            if piece > 0 && remaining >= piece {
                code |= 1 << bit;
                remaining -= piece;
            }
        }

        // Track the decoder's reconstruction exactly so both sides agree
        // on predictor and step state.
        let diff = reconstruct(code & 0x3F, step, BIT_SHIFT);
        predictor[ch] = if code & 0x40 != 0 {
            predictor[ch] - diff
        } else {
            predictor[ch] + diff
        }
        .clamp(i32::from(i16::MIN), i32::from(i16::MAX));

        output.push(code);
        step_index[ch] = (step_index[ch] + index_adjust(code & 0x3F)).clamp(0, MAX_STEP_INDEX);
        ch = (ch + 1) % channels;
    }

    Ok(output)
}
