// Forward to the `log` facade when the `log` feature is on, otherwise compile
// to nothing.

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!(target: "promise_then", $($arg)*);
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!(target: "promise_then", $($arg)*);
    };
}

pub(crate) use debug;
pub(crate) use trace;
