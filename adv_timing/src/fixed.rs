//! 16.16 fixed-point helpers shared by the sample-driven scheduler and the
//! bundled generators.

pub const FIXP_SHIFT: u32 = 16;
pub const FIXP_ONE: u64 = 1 << FIXP_SHIFT;

/// Number of output frames between two logical ticks, in 16.16 fixed point.
///
/// Equivalent to `(sample_rate << 16) / frequency`, evaluated as a quotient
/// and remainder pair so the shift never overflows for large rates.
pub fn samples_per_tick(sample_rate: u32, frequency: u32) -> u64 {
    assert!(frequency > 0, "callback frequency must be non-zero");
    let rate = u64::from(sample_rate);
    let freq = u64::from(frequency);
    let whole = rate / freq;
    let rem = rate % freq;
    (whole << FIXP_SHIFT) + (rem << FIXP_SHIFT) / freq
}

/// Whole frames contained in a fixed-point quantity.
pub fn whole_frames(value: u64) -> u64 {
    value >> FIXP_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_division(sample_rate: u32, frequency: u32) -> u64 {
        (u64::from(sample_rate) << FIXP_SHIFT) / u64::from(frequency)
    }

    #[test]
    fn split_division_matches_reference_for_22khz_at_60hz() {
        let split = samples_per_tick(22_050, 60);
        let reference = single_division(22_050, 60);
        assert!(split.abs_diff(reference) <= 1, "{split} vs {reference}");
        assert_eq!(whole_frames(split), 367);
    }

    #[test]
    fn split_division_tracks_reference_across_rates() {
        for rate in [8_000, 11_025, 22_050, 44_100, 48_000, 96_000, 192_000] {
            for freq in [1, 7, 18, 60, 70, 100, 250, 1_000, 44_100] {
                let split = samples_per_tick(rate, freq);
                let reference = single_division(rate, freq);
                assert!(
                    split.abs_diff(reference) <= 1,
                    "rate {rate} freq {freq}: {split} vs {reference}"
                );
            }
        }
    }

    #[test]
    fn large_rates_do_not_overflow() {
        let value = samples_per_tick(u32::MAX, 1);
        assert_eq!(whole_frames(value), u64::from(u32::MAX));
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn zero_frequency_is_rejected() {
        samples_per_tick(44_100, 0);
    }
}
