use crate::{BusHelper, Result, transport::BusTransport};

/// Binds the helper to test-runner boundaries.
///
/// The test framework's hooks call these methods; the binder owns *when*
/// state is reset and the transport is torn down, the helper owns *how*.
///
/// - suite start: establish the connection (idempotent)
/// - test start and test end: reset the message buffer, so no captured
///   message leaks across tests
/// - suite end: close the transport and release subscriptions (idempotent)
///
/// All hooks are no-ops on a disabled helper.
///
/// # Example
///
/// ```ignore
/// let binder = LifecycleBinder::new(&helper);
///
/// binder.begin_suite().await?;
/// for test in tests {
///     binder.begin_test();
///     test.run(&helper).await?;
///     binder.end_test();
/// }
/// binder.end_suite().await?;
/// ```
pub struct LifecycleBinder<'a, T> {
    helper: &'a BusHelper<T>,
}

impl<T> std::fmt::Debug for LifecycleBinder<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleBinder").finish_non_exhaustive()
    }
}

impl<'a, T: BusTransport> LifecycleBinder<'a, T> {
    pub fn new(helper: &'a BusHelper<T>) -> Self {
        Self { helper }
    }

    /// Suite setup: connect the transport if not already connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) when the
    /// connection cannot be established.
    pub async fn begin_suite(&self) -> Result<()> {
        self.helper.connect().await
    }

    /// Suite teardown: close the transport and release subscriptions.
    ///
    /// Safe to call when the transport is already closed.
    pub async fn end_suite(&self) -> Result<()> {
        self.helper.disconnect().await
    }

    /// Test setup: start from an empty message buffer.
    pub fn begin_test(&self) {
        self.helper.reset_buffer();
    }

    /// Test teardown: drop everything the test captured.
    pub fn end_test(&self) {
        self.helper.reset_buffer();
    }
}
