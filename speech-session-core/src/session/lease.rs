/// A port handle owned for the duration of a scope.
///
/// `release` runs exactly once, when the lease is dropped: on normal
/// return, early return, or unwinding. Leases declared later are dropped
/// first, which gives reverse-of-acquisition release order for free.
pub(crate) struct Lease<H, R>
where
    R: FnMut(H),
{
    handle: Option<H>,
    release: R,
    label: &'static str,
}

impl<H, R> Lease<H, R>
where
    R: FnMut(H),
{
    pub(crate) fn new(label: &'static str, handle: H, release: R) -> Self {
        log::debug!("{} acquired", label);
        Self {
            handle: Some(handle),
            release,
            label,
        }
    }

    /// `None` only once the lease is being dropped.
    pub(crate) fn handle_mut(&mut self) -> Option<&mut H> {
        self.handle.as_mut()
    }
}

impl<H, R> Drop for Lease<H, R>
where
    R: FnMut(H),
{
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            (self.release)(handle);
            log::debug!("{} released", self.label);
        }
    }
}
