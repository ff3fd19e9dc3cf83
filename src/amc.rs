//! Adaptive modulation and coding.
//!
//! Two pure lookups: SNR to MCS index, and MCS index to modulation. The
//! MCS index is the 4-bit value that travels in the parameter-push MACC
//! SDUs, so everything here stays inside 0..=15; SNR beyond the highest
//! threshold saturates at the top index. The threshold table is a data
//! constant owned by this module; both sides of the link carry the same
//! copy.

use crate::wire::Modulation;

/// The highest MCS index the 4-bit field can signal.
const MAX_MCS: u8 = 15;

/// SNR thresholds in dB. `snr_to_mcs` returns the index of the first
/// threshold above the measured SNR, so higher SNR selects a higher MCS.
const SNR_THRESHOLDS: [f32; 27] = [
    -6.7, -4.7, -2.3, 0.2, 2.4, 4.3, 5.9, 8.1, 10.3, 11.7, 14.1, 16.3, 18.7, 21.0, 22.7, 24.2,
    25.9, 27.4, 28.9, 30.3, 31.7, 33.1, 34.5, 35.9, 37.3, 38.7, 40.1,
];

/// Modulation per MCS index.
const MCS_MODULATION: [Modulation; 16] = [
    Modulation::Qpsk,
    Modulation::Qpsk,
    Modulation::Qpsk,
    Modulation::Qpsk,
    Modulation::Qpsk,
    Modulation::Qpsk,
    Modulation::Qam16,
    Modulation::Qam16,
    Modulation::Qam16,
    Modulation::Qam16,
    Modulation::Qam16,
    Modulation::Qam64,
    Modulation::Qam64,
    Modulation::Qam64,
    Modulation::Qam256,
    Modulation::Qam256,
];

/// Map a measured SNR to the 4-bit MCS index (0..=15).
pub fn snr_to_mcs(snr: f32) -> u8 {
    let mut mcs = 0u8;
    while (mcs as usize) < SNR_THRESHOLDS.len() {
        if snr < SNR_THRESHOLDS[mcs as usize] {
            break;
        }
        mcs += 1;
    }
    mcs.min(MAX_MCS)
}

/// The modulation an MCS index transmits with. Out-of-range indices (a
/// hand-edited parameter file, say) clamp to the top of the table.
pub fn modulation_for_mcs(mcs: u8) -> Modulation {
    MCS_MODULATION[(mcs as usize).min(MCS_MODULATION.len() - 1)]
}
