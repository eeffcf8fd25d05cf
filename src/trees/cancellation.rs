use crossbeam_utils::atomic::AtomicCell;

/// Cooperative cancellation hook polled by the builder.
///
/// The builder polls at every fork decision and before creating each node. There is no other
/// timeout mechanism, so any wall-clock policy belongs in the implementation.
pub trait ShouldCancelCallback: Sync {
    /// Returns true once the build should stop.
    fn should_cancel(&self) -> bool;
}

/// Callback that never cancels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl ShouldCancelCallback for NeverCancel {
    #[inline(always)]
    fn should_cancel(&self) -> bool {
        false
    }
}

/// Callback backed by a flag another thread can raise.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicCell<bool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of any build polling this flag.
    pub fn cancel(&self) {
        self.cancelled.store(true);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load()
    }
}

impl ShouldCancelCallback for CancelFlag {
    #[inline(always)]
    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

impl<F> ShouldCancelCallback for F
where
    F: Fn() -> bool + Sync,
{
    #[inline(always)]
    fn should_cancel(&self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.should_cancel());
        flag.cancel();
        assert!(flag.should_cancel());
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_closure_callback() {
        let always = || true;
        assert!(always.should_cancel());
        assert!(!NeverCancel.should_cancel());
    }
}
