use std::future::Future;

use tokio::{runtime::Handle, task::JoinHandle};

use crate::error::{JwksClientError, result::JwksClientResult};

/// Drive `resolution` on the current tokio runtime and hand its outcome to
/// `callback`.
///
/// The result reaches the callback as produced: an error keeps its variant
/// and message. Outside of a tokio runtime the resolution cannot run: the
/// callback is then invoked immediately with [`JwksClientError::Default`]
/// and `None` is returned.
pub fn with_callback<T, Fut, Cb>(resolution: Fut, callback: Cb) -> Option<JoinHandle<()>>
where
    T: Send + 'static,
    Fut: Future<Output = JwksClientResult<T>> + Send + 'static,
    Cb: FnOnce(JwksClientResult<T>) + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(async move {
            callback(resolution.await);
        })),
        Err(e) => {
            callback(Err(JwksClientError::Default(format!(
                "no tokio runtime to resolve the signing key: {e}"
            ))));
            None
        }
    }
}
