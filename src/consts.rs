//! The wire-fixed constants of the air interface.
//!
//! Everything in this module is shared with the PHY and with peer MACs, so
//! none of it may be tuned per deployment.

/// The number of resource blocks spanning the whole band.
pub const MAX_NUM_RB: u8 = 132;

/// The highest valid resource block index.
pub const LAST_RB: u8 = 131;

/// The number of resource blocks covered by one TV channel.
pub const RBS_PER_CHANNEL: u8 = 33;

/// The number of TV channels tracked by the fusion lookup table.
pub const NUM_TV_CHANNELS: u8 = 4;

/// Baseband sample rate in Hz.
pub const SAMPLE_RATE: f32 = 30.72e6;

/// Bandwidth of a single resource block in Hz.
pub const RB_BANDWIDTH: f32 = 180.0e3;

/// Downlink control information overhead, in QAM symbols, spent on the
/// first transport block of an allocation.
pub const DCI_SIZE: u32 = 256;

/// The number of transport blocks amortizing one extra DCI.
pub const NUM_TB_PER_DCI: u32 = 8;

/// The duration of one subframe in nanoseconds.
pub const SUBFRAME_DURATION_NS: u32 = 4_600;

/// One numerology: a predefined set of subcarrier and symbol parameters.
///
/// The id selects a row of [`NUMEROLOGY`]; the choice is system wide and
/// travels in the subframe-start control messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Numerology {
    /// Number of subcarriers
    pub k: u32,
    /// Number of subsymbols
    pub m: u32,
    /// Number of samples in the cyclic prefix
    pub n_cp: u32,
    /// Number of samples in the cyclic suffix
    pub n_cs: u32,
    /// Number of windowing samples
    pub n_w: u32,
    /// Number of active subcarriers
    pub k_on: u32,
    /// Number of inactive subcarriers
    pub k_off: u32,
    /// Roll-off factor
    pub alpha: f32,
    /// Number of subcarriers per resource block
    pub subcarriers_per_rb: u32,
    /// Number of symbols in a subframe
    pub symbols_per_subframe: u32,
    /// Pilot spacing in time
    pub pilot_dt: u32,
    /// Pilot spacing in frequency
    pub pilot_df: u32,
    /// Number of pilot subcarriers
    pub num_pilot_sc: u32,
}

/// The six predefined numerologies, indexed by numerology id.
pub const NUMEROLOGY: [Numerology; 6] = [
    Numerology {
        k: 16384,
        m: 4,
        n_cp: 4352,
        n_cs: 768,
        n_w: 512,
        k_on: 12672,
        k_off: 3712,
        alpha: 0.0,
        subcarriers_per_rb: 96,
        symbols_per_subframe: 2,
        pilot_dt: 2,
        pilot_df: 4,
        num_pilot_sc: 3168,
    },
    Numerology {
        k: 8192,
        m: 4,
        n_cp: 2176,
        n_cs: 384,
        n_w: 256,
        k_on: 6336,
        k_off: 1856,
        alpha: 0.0,
        subcarriers_per_rb: 48,
        symbols_per_subframe: 4,
        pilot_dt: 4,
        pilot_df: 4,
        num_pilot_sc: 1584,
    },
    Numerology {
        k: 4096,
        m: 4,
        n_cp: 1088,
        n_cs: 192,
        n_w: 128,
        k_on: 3168,
        k_off: 928,
        alpha: 0.0,
        subcarriers_per_rb: 24,
        symbols_per_subframe: 8,
        pilot_dt: 4,
        pilot_df: 4,
        num_pilot_sc: 792,
    },
    Numerology {
        k: 2048,
        m: 4,
        n_cp: 544,
        n_cs: 96,
        n_w: 64,
        k_on: 1584,
        k_off: 500,
        alpha: 0.0,
        subcarriers_per_rb: 12,
        symbols_per_subframe: 16,
        pilot_dt: 4,
        pilot_df: 4,
        num_pilot_sc: 396,
    },
    Numerology {
        k: 1024,
        m: 4,
        n_cp: 272,
        n_cs: 48,
        n_w: 32,
        k_on: 792,
        k_off: 232,
        alpha: 0.0,
        subcarriers_per_rb: 6,
        symbols_per_subframe: 32,
        pilot_dt: 4,
        pilot_df: 3,
        num_pilot_sc: 264,
    },
    Numerology {
        k: 1024,
        m: 2,
        n_cp: 136,
        n_cs: 24,
        n_w: 16,
        k_on: 792,
        k_off: 232,
        alpha: 0.0,
        subcarriers_per_rb: 6,
        symbols_per_subframe: 64,
        pilot_dt: 4,
        pilot_df: 6,
        num_pilot_sc: 132,
    },
];
