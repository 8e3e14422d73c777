use std::fmt::Display;

use crate::error::JwksClientError;

pub type JwksClientResult<R> = Result<R, JwksClientError>;

pub trait JwksClientResultHelper<T> {
    fn with_context<D, O>(self, op: O) -> JwksClientResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D;
}

impl<T, E> JwksClientResultHelper<T> for Result<T, E>
where
    E: std::error::Error,
{
    fn with_context<D, O>(self, op: O) -> JwksClientResult<T>
    where
        D: Display + Send + Sync + 'static,
        O: FnOnce() -> D,
    {
        self.map_err(|e| JwksClientError::Default(format!("{}: {e}", op())))
    }
}
