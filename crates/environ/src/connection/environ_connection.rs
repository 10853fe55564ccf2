use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{error, info};

use crate::codec::EnvironDecoder;
use crate::protocol::{BaseEnviron, Environ, RequestError};
use crate::request::ConnectionId;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// The read side of a client connection, decoded into environments.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
#[derive(Debug)]
pub struct EnvironConnection<R> {
    connection: ConnectionId,
    framed_read: FramedRead<R, EnvironDecoder>,
}

impl<R> EnvironConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, connection: ConnectionId, client_addr: &str) -> Self {
        Self::with_decoder(reader, connection, EnvironDecoder::new(connection, client_addr))
    }

    pub fn with_base(reader: R, connection: ConnectionId, client_addr: &str, base: Arc<BaseEnviron>) -> Self {
        Self::with_decoder(reader, connection, EnvironDecoder::with_base(connection, client_addr, base))
    }

    fn with_decoder(reader: R, connection: ConnectionId, decoder: EnvironDecoder) -> Self {
        Self { connection, framed_read: FramedRead::with_capacity(reader, decoder, READ_BUFFER_SIZE) }
    }

    /// Waits for the next complete request.
    ///
    /// Returns `Ok(None)` once the client closed the connection. A rejected request
    /// ends the connection: the error carries the code to answer with.
    pub async fn next_environ(&mut self) -> Result<Option<Environ>, RequestError> {
        match self.framed_read.next().await {
            Some(Ok(environ)) => Ok(Some(environ)),

            Some(Err(e)) => {
                error!(connection = %self.connection, cause = %e, "can't receive next request");
                Err(e)
            }

            None => {
                info!(connection = %self.connection, "cant read more request, break this connection down");
                Ok(None)
            }
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Returns the reader, discarding buffered bytes.
    pub fn into_inner(self) -> R {
        self.framed_read.into_inner()
    }
}
