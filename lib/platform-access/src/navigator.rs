//! Full-page navigation to the identity provider.

use url::Url;

/// Sends the user agent to a URL outside the application.
///
/// The navigation must happen in the same browsing context that will
/// receive the callback, or the persisted verifier cannot be recovered.
pub trait Navigator: Send + Sync {
    /// Navigates to `url`.
    fn navigate(&self, url: &Url);
}

/// A navigator that only logs, for contexts where the caller performs the
/// redirect itself (for example an HTTP handler answering with a 303).
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, url: &Url) {
        tracing::debug!(host = url.host_str().unwrap_or_default(), "navigation handed to caller");
    }
}
