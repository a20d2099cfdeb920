//! Error types for the browser page layer.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`Page`](super::Page) implementation.
///
/// Messages from the underlying browser driver are carried as strings so
/// that fake pages used in tests can produce the same variants.
#[derive(Debug, Error)]
pub enum PageError {
    /// The browser process could not be started or configured.
    #[error("failed to launch browser: {message}")]
    Launch {
        /// Driver error message.
        message: String,
    },

    /// Navigating the page to a URL failed.
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// Target URL of the navigation.
        url: String,
        /// Driver error message.
        message: String,
    },

    /// Network activity did not settle in time.
    #[error("network did not become idle within {timeout:?}")]
    IdleTimeout {
        /// How long we waited.
        timeout: Duration,
    },

    /// Evaluating script in the page failed or returned an unexpected shape.
    #[error("page script failed: {message}")]
    Script {
        /// Driver or decoding error message.
        message: String,
    },

    /// Subscribing to page network events failed.
    #[error("failed to subscribe to network events: {message}")]
    Subscription {
        /// Driver error message.
        message: String,
    },

    /// The buffered body of a finished request could not be fetched.
    #[error("failed to fetch response body of {url}: {message}")]
    ResponseBody {
        /// URL of the finished request.
        url: String,
        /// Driver or decoding error message.
        message: String,
    },

    /// The page or browser connection is gone.
    #[error("browser page closed")]
    Closed,
}

impl PageError {
    /// Creates a launch error.
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a script evaluation error.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Creates a subscription error.
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription {
            message: message.into(),
        }
    }

    /// Creates a response body error.
    pub fn response_body(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResponseBody {
            url: url.into(),
            message: message.into(),
        }
    }
}
