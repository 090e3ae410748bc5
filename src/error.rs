use std::fmt;

/// Turns recoverable failures into log lines.
///
/// Used where an error affects a single container or line and must not stop the
/// surrounding loop.
pub trait ResultOkLogExt<T, E> {
    /// Logs `Err` at error level and discards it.
    fn ok_log(self) -> Option<T>;

    /// Logs `Err` at warn level, prefixed with `context`, and discards it.
    fn ok_warn(self, context: impl fmt::Display) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }

    fn ok_warn(self, context: impl fmt::Display) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
