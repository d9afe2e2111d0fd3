use crate::compression::vbyte::VByteEncoder;
use crate::core::error::{Error, ErrorKind, Result};

/// Delta encoding for sorted stub indices (posting list blobs)
pub struct DeltaEncoder;

impl DeltaEncoder {
    /// Input must be strictly ascending; every gap is vbyte encoded,
    /// the first value as a gap from zero.
    pub fn encode_sorted(nums: &[u32]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(nums.len() + 1);
        let mut prev: Option<u32> = None;

        for &num in nums {
            let delta = match prev {
                None => num,
                Some(p) if num > p => num - p,
                Some(p) => {
                    return Err(Error::new(
                        ErrorKind::InvalidInput,
                        format!("posting list not ascending: {} after {}", num, p),
                    ));
                }
            };
            VByteEncoder::encode_u32(&mut output, delta);
            prev = Some(num);
        }

        Ok(output)
    }

    pub fn decode_sorted(data: &[u8]) -> Result<Vec<u32>> {
        let deltas = VByteEncoder::decode_u32_list(data)?;
        let mut nums = Vec::with_capacity(deltas.len());
        let mut prev = 0u32;

        for (i, delta) in deltas.into_iter().enumerate() {
            let val = if i == 0 {
                delta
            } else {
                prev.checked_add(delta).ok_or_else(|| {
                    Error::new(ErrorKind::Parse, "posting list delta overflow".to_string())
                })?
            };
            nums.push(val);
            prev = val;
        }

        Ok(nums)
    }
}
