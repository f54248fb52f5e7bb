//! Integration-time auto-ranging for the Vishay light sensors.
//!
//! A channel at full scale means the integration time is too long; the largest
//! channel staying below 80% of half scale means the resolution is wasted. Within
//! one ranging pass the direction never reverses, so the pass always terminates.

/// Full-scale 16-bit count.
pub const OVERFLOW: u16 = u16::MAX;

/// Largest channel value below which the integration time is lengthened:
/// 80% of half scale, `2^15 * 4 / 5`.
pub const UNDERFLOW: u16 = ((1u32 << 15) * 4 / 5) as u16;

/// An integration time setting that can be stepped up or down.
pub trait IntegrationStep: Copy + PartialEq {
    /// Next shorter setting, if any.
    fn shorter(self) -> Option<Self>;
    /// Next longer setting, if any.
    fn longer(self) -> Option<Self>;
}

/// Direction of an integration time change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Shorter,
    Longer,
}

/// Decide the next integration time for `counts` measured with `current`.
///
/// Returns `None` once the counts sit in range, a limit is reached, or the
/// adjustment would reverse `previous`.
pub fn next_step<T: IntegrationStep>(
    current: T,
    counts: &[u16],
    previous: Option<Direction>,
) -> Option<(T, Direction)> {
    let peak = counts.iter().copied().max()?;

    if peak == OVERFLOW {
        if previous == Some(Direction::Longer) {
            return None;
        }
        return current.shorter().map(|it| (it, Direction::Shorter));
    }

    if peak < UNDERFLOW {
        if previous == Some(Direction::Shorter) {
            return None;
        }
        return current.longer().map(|it| (it, Direction::Longer));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Step(u8);

    impl IntegrationStep for Step {
        fn shorter(self) -> Option<Self> {
            self.0.checked_sub(1).map(Step)
        }

        fn longer(self) -> Option<Self> {
            (self.0 < 5).then_some(Step(self.0 + 1))
        }
    }

    #[test]
    fn test_in_range_keeps_setting() {
        assert_eq!(next_step(Step(2), &[30000, 100, 5], None), None);
    }

    #[test]
    fn test_overflow_shortens() {
        assert_eq!(
            next_step(Step(2), &[OVERFLOW, 100], None),
            Some((Step(1), Direction::Shorter))
        );
        assert_eq!(next_step(Step(0), &[OVERFLOW], None), None);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(UNDERFLOW, 26_214);
        assert_eq!(OVERFLOW, 0xFFFF);
    }

    #[test]
    fn test_underflow_lengthens() {
        assert_eq!(
            next_step(Step(2), &[UNDERFLOW - 1, 0], None),
            Some((Step(3), Direction::Longer))
        );
        assert_eq!(next_step(Step(5), &[0], None), None);
    }

    #[test]
    fn test_never_reverses() {
        assert_eq!(next_step(Step(2), &[10], Some(Direction::Shorter)), None);
        assert_eq!(
            next_step(Step(2), &[OVERFLOW], Some(Direction::Longer)),
            None
        );
    }

    #[test]
    fn test_empty_counts() {
        assert_eq!(next_step(Step(2), &[], None), None);
    }
}
