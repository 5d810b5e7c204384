use std::fmt;

#[derive(Debug)]
pub enum RouterError {
    /// Rejected before any engine call: zero tick spacing, malformed
    /// bounds, zero liquidity delta and the like.
    InvalidArgument(String),
    /// Precondition failure surfaced by the engine (slippage guard,
    /// expired deadline, insufficient batch funding). Propagated verbatim,
    /// never retried; the batch had no partial effect.
    Engine(String),
    /// Position id never minted or already burned. Recoverable.
    NotFound(String),
    /// Transport or malformed-reply fault.
    Rpc(String),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            RouterError::Engine(msg) => write!(f, "engine rejected batch: {msg}"),
            RouterError::NotFound(msg) => write!(f, "not found: {msg}"),
            RouterError::Rpc(msg) => write!(f, "rpc error: {msg}"),
        }
    }
}

impl std::error::Error for RouterError {}

impl RouterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RouterError::NotFound(_))
    }
}
