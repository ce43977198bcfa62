use crate::RequestBuffer;

/// Callback that processes a request once all parts arrive or it expires.
///
/// The handler runs on the thread that delivered the final part, or on the
/// scheduler's thread when the request times out. Use
/// [`RequestBuffer::is_full`] to tell the two apart.
///
/// Any closure `Fn(RequestBuffer<T>) + Send + Sync` is a handler.
///
/// ```
/// use gatherer::{RequestBuffer, RequestHandler};
///
/// struct Printer;
/// impl RequestHandler<u32> for Printer {
///     fn handle(&self, buffer: RequestBuffer<u32>) {
///         println!("complete={} parts={:?}", buffer.is_full(), buffer);
///     }
/// }
/// ```
pub trait RequestHandler<T>: Send + Sync + 'static {
    fn handle(&self, buffer: RequestBuffer<T>);
}

impl<T, F> RequestHandler<T> for F
where
    F: Fn(RequestBuffer<T>) + Send + Sync + 'static,
{
    fn handle(&self, buffer: RequestBuffer<T>) {
        self(buffer)
    }
}
