//! Collaborative spectrum sensing fusion.
//!
//! Every UE reports a 4-bit spectrum sensing report, one bit per TV
//! channel, 1 = perceived idle. Fusion is the conservative AND: a channel
//! is declared usable only when every report inside the window agreed it
//! was idle.
//!
//! The window is keyed to the subframe clock: the first report after a
//! reset arms a deadline `ss_report_wait_timeout` subframes ahead, and the
//! engine polls for expiry on every tick. There is no detached timer.

/// Staging value meaning "all four channels idle".
const ALL_IDLE: u8 = 0b1111;

#[derive(Debug)]
pub struct Cosora {
    /// Window length in subframes. Zero disables fusion entirely.
    window: u64,
    staging: u8,
    deadline: Option<u64>,
}

/// Outcome of a window expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum FusionOutcome {
    /// The fused value equals the published LUT; nothing to do.
    Unchanged,
    /// The fused value differs; the caller must publish it and
    /// reconfigure.
    Changed(u8),
}

impl Cosora {
    pub fn new(ss_report_wait_timeout: u16) -> Self {
        Self {
            window: ss_report_wait_timeout as u64,
            staging: ALL_IDLE,
            deadline: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.window > 0
    }

    /// A window is open; the Stop transition must wait for it to close.
    pub fn is_busy(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fold one spectrum sensing report into the staging value. The first
    /// report after a reset opens the window.
    pub fn fuse(&mut self, ss_report: u8, now: u64) {
        if !self.is_enabled() {
            return;
        }

        self.staging &= ss_report & ALL_IDLE;

        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
            trace!(
                "Fusion window opened at subframe {}, expires at {}",
                now,
                now + self.window
            );
        }
    }

    /// Check for window expiry. Call once per subframe tick with the
    /// currently published LUT.
    pub fn poll(&mut self, now: u64, published_lut: u8) -> Option<FusionOutcome> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                let fused = self.staging;
                self.staging = ALL_IDLE;
                self.deadline = None;

                Some(if fused != published_lut {
                    debug!("Fusion produced new LUT value {}", fused);
                    FusionOutcome::Changed(fused)
                } else {
                    FusionOutcome::Unchanged
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_is_the_and_of_all_reports() {
        let mut cosora = Cosora::new(10);

        cosora.fuse(0b1110, 0);
        cosora.fuse(0b1111, 3);
        cosora.fuse(0b1011, 7);
        assert!(cosora.is_busy());

        // Not expired yet.
        assert_eq!(cosora.poll(9, 0b1111), None);

        assert_eq!(
            cosora.poll(10, 0b1111),
            Some(FusionOutcome::Changed(0b1010))
        );
        assert!(!cosora.is_busy());
    }

    #[test]
    fn unchanged_value_does_not_reconfigure() {
        let mut cosora = Cosora::new(5);
        cosora.fuse(0b1111, 0);
        assert_eq!(cosora.poll(5, 0b1111), Some(FusionOutcome::Unchanged));
    }

    #[test]
    fn staging_resets_between_windows() {
        let mut cosora = Cosora::new(5);
        cosora.fuse(0b0001, 0);
        assert_eq!(cosora.poll(5, 0b1111), Some(FusionOutcome::Changed(0b0001)));

        // A fresh window starts from all-idle again.
        cosora.fuse(0b1110, 6);
        assert_eq!(
            cosora.poll(11, 0b0001),
            Some(FusionOutcome::Changed(0b1110))
        );
    }

    #[test]
    fn zero_timeout_disables_fusion() {
        let mut cosora = Cosora::new(0);
        cosora.fuse(0b0000, 0);
        assert!(!cosora.is_busy());
        assert_eq!(cosora.poll(100, 0b1111), None);
    }
}
