//! Errors that end a run before anything on the host or guest is touched.

/// A value the pipeline needs could not be extracted from tool output.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// `showvminfo` had no usable `hostonlyadapter` field.
    #[error("unable to find name of vboxnet")]
    AdapterName,
    /// No host-only interface block matched the adapter, or it had no address.
    #[error("unable to find ip of vboxnet {0}")]
    AdapterAddress(String),
    /// `boot2docker ip` printed nothing.
    #[error("unable to find ip of VM {0}")]
    GuestAddress(String),
    /// A value was found but is not a dotted-quad address.
    #[error("{what} is not an IPv4 address: {value:?}")]
    InvalidAddress {
        /// Which address was being resolved.
        what: &'static str,
        /// The offending text.
        value: String,
    },
}
