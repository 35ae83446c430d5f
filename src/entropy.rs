//! Entropy source — cryptographically strong random words for identity
//! generation.
//!
//! The only production source is the operating system CSPRNG. Failure to
//! read it is fatal: an identity drawn from weak randomness would break
//! the uniqueness of `player_id`.

use rand_core::{OsRng, RngCore};

use crate::error::AppError;

/// Guest numbers are 12 bits wide: `0..=0xFFF`.
pub const GUEST_NUMBER_MASK: u32 = 0x0FFF;

/// A source of cryptographically strong 32-bit words.
pub trait EntropySource {
    /// Fill `out` with random words.
    fn fill_u32(&mut self, out: &mut [u32]) -> Result<(), AppError>;
}

/// Operating-system CSPRNG (`getrandom` under the hood).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_u32(&mut self, out: &mut [u32]) -> Result<(), AppError> {
        let mut buf = vec![0u8; out.len() * 4];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| AppError::Entropy(format!("os rng unavailable: {e}")))?;
        for (word, chunk) in out.iter_mut().zip(buf.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }
}

/// Draw a guest number in `[0, 0xFFF]`.
pub fn guest_number(source: &mut dyn EntropySource) -> Result<u32, AppError> {
    let mut word = [0u32; 1];
    source.fill_u32(&mut word)?;
    Ok(word[0] & GUEST_NUMBER_MASK)
}
