use thiserror::Error;

/// An HTTP fetch that never produced a body.
///
/// The message carries the whole cause chain: reqwest's own text only names the URL.
#[derive(Debug, Error)]
#[error("request to {url} failed: {}", error_chain(.source))]
pub struct TransportError {
    pub url: String,
    #[source]
    pub source: reqwest::Error,
}

/// `outer: inner: root`, skipping causes that repeat the previous message.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut messages = vec![err.to_string()];
    let mut cause = err.source();
    while let Some(e) = cause {
        let message = e.to_string();
        if messages.last() != Some(&message) {
            messages.push(message);
        }
        cause = e.source();
    }
    messages.join(": ")
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid mailbox {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("no recipients configured")]
    NoRecipients,

    #[error("failed to build notification message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}
