/// Bounded exponential backoff for failed compare-and-swap retries.
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;

    #[inline(always)]
    pub(crate) fn new() -> Self {
        Self { step: 0 }
    }

    #[inline(always)]
    pub(crate) fn spin(&mut self) {
        for _ in 0..(1u32 << self.step.min(Self::SPIN_LIMIT)) {
            core::hint::spin_loop();
        }
        if self.step <= Self::SPIN_LIMIT {
            self.step += 1;
        }
    }
}
