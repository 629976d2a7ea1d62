//! Line-oriented telnet transport.
//!
//! DMPS consoles need no option negotiation: after a bare newline they print
//! a prompt ending in `>` and from then on exchange `\r\n`-terminated lines.
//! Every operation takes an explicit deadline and nothing here retries.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::trace;

/// Character that ends the console prompt.
pub const PROMPT_TERMINATOR: u8 = b'>';

/// Longest line accepted from a device, terminator included.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

const LINE_ENDING: &str = "\r\n";

/// Transport-level failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("connection closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An open console connection.
#[derive(Debug)]
pub struct TelnetConnection {
    peer: String,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl TelnetConnection {
    /// Dial the device without performing the handshake.
    pub async fn connect(
        address: &str,
        port: &str,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let peer = format!("{address}:{port}");

        let stream = match timeout(connect_timeout, TcpStream::connect(peer.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransportError::Connect { addr: peer, source }),
            Err(_) => return Err(TransportError::ConnectTimeout(peer)),
        };
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            peer,
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    /// Wake the console with a newline and wait for its prompt.
    ///
    /// Returns whatever the device printed up to and including the prompt.
    pub async fn handshake(&mut self, deadline: Duration) -> Result<String, TransportError> {
        let exchange = async {
            self.writer.write_all(LINE_ENDING.as_bytes()).await?;
            self.writer.flush().await?;

            let mut buf = Vec::new();
            self.reader.read_until(PROMPT_TERMINATOR, &mut buf).await?;
            Ok::<_, io::Error>(buf)
        };

        let buf = match timeout(deadline, exchange).await {
            Ok(Ok(buf)) => buf,
            Ok(Err(e)) => return Err(TransportError::Handshake(e.to_string())),
            Err(_) => {
                return Err(TransportError::Handshake(format!(
                    "no prompt within {deadline:?}"
                )));
            }
        };

        if buf.last() != Some(&PROMPT_TERMINATOR) {
            return Err(TransportError::Handshake(
                "connection closed before prompt".to_string(),
            ));
        }

        let banner = String::from_utf8_lossy(&buf).into_owned();
        trace!(peer = %self.peer, banner = %banner.trim(), "Handshake complete");
        Ok(banner)
    }

    /// Dial and handshake in one step.
    pub async fn open(
        address: &str,
        port: &str,
        connect_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut conn = Self::connect(address, port, connect_timeout).await?;
        conn.handshake(handshake_timeout).await?;
        Ok(conn)
    }

    /// Read one line, including its terminator.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Output that runs past
    /// [`MAX_LINE_LENGTH`] without a newline is an error.
    pub async fn read_line(&mut self, deadline: Duration) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE_LENGTH as u64);

        match timeout(deadline, limited.read_until(b'\n', &mut buf)).await {
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(n)) if n >= MAX_LINE_LENGTH && buf.last() != Some(&b'\n') => {
                Err(TransportError::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                })
            }
            Ok(Ok(_)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout {
                op: "read",
                after: deadline,
            }),
        }
    }

    /// Write a command terminated with `\r\n` and flush it.
    pub async fn write_command(
        &mut self,
        command: &str,
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let write = async {
            self.writer.write_all(command.as_bytes()).await?;
            self.writer.write_all(LINE_ENDING.as_bytes()).await?;
            self.writer.flush().await
        };

        match timeout(deadline, write).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::Timeout {
                op: "write",
                after: deadline,
            }),
        }
    }

    /// Drop everything the peer has sent that has not been read yet.
    ///
    /// Covers both the local read buffer and bytes already queued on the
    /// socket. Never waits for more data.
    pub fn discard_buffered(&mut self) -> Vec<u8> {
        let mut discarded = self.reader.buffer().to_vec();
        self.reader.consume(discarded.len());

        let mut chunk = [0u8; 1024];
        loop {
            match self.reader.get_ref().try_read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => discarded.extend_from_slice(&chunk[..n]),
                Err(_) => break,
            }
        }

        discarded
    }

    /// Remote `address:port`.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Shut down the write side. The socket closes when dropped.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
