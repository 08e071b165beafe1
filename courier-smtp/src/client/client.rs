//! SMTP client connection with STARTTLS support and a shared session deadline.

use std::{io, time::Duration};

use courier_common::{incoming, internal, outgoing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{TlsConnector, rustls::pki_types::ServerName};

use super::{
    data,
    deadline::Deadline,
    error::{ClientError, Result},
    extensions::Extensions,
    response::Response,
    tls,
};

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, server_name: &str, verify: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::Tls("connection is already TLS".to_string()));
        };

        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| ClientError::Tls(format!("invalid server name: {e}")))?;

        let tls_stream = TlsConnector::from(tls::client_config(verify))
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::Tls(e.to_string()))?;

        Ok(Self::Tls(Box::new(tls_stream)))
    }

    async fn shutdown(&mut self) {
        let _ = match self {
            Self::Plain(stream) => stream.shutdown().await,
            Self::Tls(stream) => stream.shutdown().await,
        };
    }
}

/// One SMTP session with one remote host.
///
/// Every network operation is bounded by the session [`Deadline`]; once it
/// passes, all further operations fail with [`ClientError::Timeout`]. The
/// connection is closed when the client is dropped.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    deadline: Deadline,
    server_name: String,
    /// `host:port`, tagged on every traced line.
    peer: String,
    extensions: Extensions,
}

impl SmtpClient {
    /// Connects to `host:port`.
    ///
    /// The dial itself is limited to `dial_timeout` or whatever is left of
    /// `deadline`, whichever is shorter.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connect` if the host cannot be reached in time.
    pub async fn connect(
        host: &str,
        port: u16,
        deadline: Deadline,
        dial_timeout: Duration,
    ) -> Result<Self> {
        let addr = format!("{host}:{port}");
        internal!(peer = addr, level = DEBUG, "Dialing");

        let dial = tokio::time::timeout(
            dial_timeout.min(deadline.remaining()),
            TcpStream::connect((host, port)),
        )
        .await;

        let stream = match dial {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
            Err(_) => {
                return Err(ClientError::Connect {
                    addr,
                    source: io::Error::new(io::ErrorKind::TimedOut, "dial timed out"),
                });
            }
        };

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            deadline,
            server_name: host.to_string(),
            peer: addr,
            extensions: Extensions::default(),
        })
    }

    /// The deadline this session runs under.
    #[must_use]
    pub const fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Extensions from the most recent successful EHLO.
    ///
    /// Empty before EHLO, after HELO, and after a TLS upgrade until EHLO is
    /// sent again.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Reads the initial server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a single command line; the CRLF is added here.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the deadline has passed.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!(peer = self.peer, "{command}");
        let line = format!("{command}\r\n");
        self.send(line.as_bytes()).await
    }

    /// Sends a command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Sends EHLO with the given identity, recording the advertised
    /// extensions on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, identity: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {identity}")).await?;
        self.extensions = if response.is_success() {
            Extensions::from_ehlo(&response)
        } else {
            Extensions::default()
        };
        Ok(response)
    }

    /// Sends HELO with the given identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, identity: &str) -> Result<Response> {
        self.extensions = Extensions::default();
        self.command(&format!("HELO {identity}")).await
    }

    /// Sends `MAIL FROM:<from>` followed by any ESMTP parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str, params: &[&str]) -> Result<Response> {
        let mut command = format!("MAIL FROM:<{from}>");
        for param in params {
            command.push(' ');
            command.push_str(param);
        }
        self.command(&command).await
    }

    /// Sends `RCPT TO:<to>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends the DATA command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message body, dot-stuffed and terminated, and reads the
    /// final reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, body: &[u8]) -> Result<Response> {
        let encoded = data::encode(body);
        outgoing!(peer = self.peer, "<{} bytes of message data>", encoded.len());
        self.send(&encoded).await?;
        self.read_response().await
    }

    /// Sends STARTTLS and, if the server agrees, upgrades the connection in
    /// place.
    ///
    /// With `verify` unset the server certificate is accepted as is. The
    /// advertised extensions are cleared on upgrade; EHLO must be sent again.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Tls` if the handshake fails. The connection is
    /// unusable afterwards.
    pub async fn starttls(&mut self, verify: bool) -> Result<Response> {
        let response = self.command("STARTTLS").await?;
        if !response.is_success() {
            return Ok(response);
        }

        let connection = self
            .connection
            .take()
            .ok_or(ClientError::ConnectionClosed)?;

        let server_name = self.server_name.clone();
        let upgraded = self
            .deadline
            .run(connection.upgrade_to_tls(&server_name, verify))
            .await?;

        internal!(peer = self.peer, level = DEBUG, "TLS established with {server_name} (verify: {verify})");

        self.connection = Some(upgraded);
        self.buffer_pos = 0;
        self.extensions = Extensions::default();

        Ok(response)
    }

    /// Sends QUIT and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        let response = self.command("QUIT").await;
        if let Some(connection) = self.connection.as_mut() {
            let _ = tokio::time::timeout(self.deadline.remaining(), connection.shutdown()).await;
        }
        self.connection = None;
        response
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;
        self.deadline.run(connection.send(data)).await
    }

    /// Reads a complete SMTP reply from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, the reply is malformed, or the
    /// deadline passes before a complete reply arrives.
    pub async fn read_response(&mut self) -> Result<Response> {
        let deadline = self.deadline;
        let response = deadline.run(self.fill_until_response()).await?;

        for (index, line) in response.lines.iter().enumerate() {
            let separator = if index + 1 == response.lines.len() {
                ' '
            } else {
                '-'
            };
            incoming!(peer = self.peer, "{}{separator}{line}", response.code);
        }

        Ok(response)
    }

    async fn fill_until_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::Parse(format!(
                        "reply too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}
