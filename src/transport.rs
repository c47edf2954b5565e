//! Line transport between the agent and the room.
//!
//! The transport itself (joining the room, reconnecting, routing) lives
//! outside this crate. The agent only sees a duplex channel of wire lines.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, trace, warn};

use crate::wire::{self, DecodeError};

/// Errors while reading the startup handshake
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("transport closed before the handshake")]
    Closed,
    #[error("malformed handshake line: {0}")]
    Decode(#[from] DecodeError),
    #[error("handshake needs 4 tokens, got {0:?}")]
    Tokens(Vec<String>),
}

/// The outgoing side of the transport is gone
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport closed")]
pub struct TransportClosed;

/// Identity given to the agent by the first line of the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Local nick in the room
    pub nick: String,
    /// Name of the hosting program
    pub program: String,
    /// Name of the config store, e.g. `pifon` for `pifon.toml`
    pub config_name: String,
    /// Config file forced by the host, if any
    pub config_path: Option<PathBuf>,
}

impl Identity {
    pub fn new(nick: impl Into<String>, config_name: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            program: "pifon".to_string(),
            config_name: config_name.into(),
            config_path: None,
        }
    }

    /// Parse a handshake line `nick;|<nick> <program> <config> <path|None>`
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let msg = wire::decode(line, None)?;
        if msg.args.len() != 4 {
            return Err(HandshakeError::Tokens(msg.args));
        }
        let config_path = match msg.args[3].as_str() {
            "None" | "none" | "-" | "" => None,
            p => Some(PathBuf::from(p)),
        };
        Ok(Self {
            nick: msg.sender,
            program: msg.args[1].clone(),
            config_name: msg.args[2].clone(),
            config_path,
        })
    }

    /// Encode as a handshake line
    pub fn to_line(&self) -> String {
        let path = self
            .config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "None".to_string());
        let none: [&str; 0] = [];
        wire::encode(
            &self.nick,
            &none,
            &[
                self.nick.as_str(),
                self.program.as_str(),
                self.config_name.as_str(),
                path.as_str(),
            ],
        )
    }
}

/// Agent side of a duplex line channel
#[derive(Debug)]
pub struct Transport {
    incoming: UnboundedReceiver<String>,
    outgoing: UnboundedSender<String>,
}

/// Room side of an in-process transport, used by tests and embedding hosts
#[derive(Debug)]
pub struct TransportPeer {
    pub tx: UnboundedSender<String>,
    pub rx: UnboundedReceiver<String>,
}

impl TransportPeer {
    /// Send a line to the agent. Returns false once the agent is gone.
    pub fn send(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }

    /// Next line written by the agent
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Everything the agent wrote so far
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }
}

impl Transport {
    /// Connected in-process pair
    pub fn pair() -> (Transport, TransportPeer) {
        let (to_agent, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_agent) = mpsc::unbounded_channel();
        (
            Transport { incoming, outgoing },
            TransportPeer {
                tx: to_agent,
                rx: from_agent,
            },
        )
    }

    /// Transport over the process's stdin and stdout. Must be called within a
    /// tokio runtime.
    pub fn stdio() -> Transport {
        Transport::from_io(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Transport over any byte stream pair, one line per message. Must be
    /// called within a tokio runtime.
    pub fn from_io<R, W>(reader: R, writer: W) -> Transport
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (transport, peer) = Transport::pair();
        let TransportPeer { tx, rx } = peer;
        tokio::spawn(read_lines(reader, tx));
        tokio::spawn(write_lines(writer, rx));
        transport
    }

    /// Read the mandatory first line
    pub async fn handshake(&mut self) -> Result<Identity, HandshakeError> {
        let line = self.incoming.recv().await.ok_or(HandshakeError::Closed)?;
        let identity = Identity::parse(&line)?;
        debug!(
            target: "agent",
            "handshake: nick='{}' program='{}' config='{}' path={:?}",
            identity.nick,
            identity.program,
            identity.config_name,
            identity.config_path
        );
        Ok(identity)
    }

    /// Next incoming line; `None` once the room side is closed
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    pub fn send(&self, line: String) -> Result<(), TransportClosed> {
        self.outgoing.send(line).map_err(|_| TransportClosed)
    }
}

/// Forward lines from `reader` until it ends. Lines that are not UTF-8 are
/// skipped.
async fn read_lines<R>(reader: R, tx: UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!(target: "wire", "input closed");
                break;
            }
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                match String::from_utf8(std::mem::take(&mut buf)) {
                    Ok(line) => {
                        trace!(target: "wire", "in: {}", line);
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(
                        target: "wire",
                        "dropping line that is not UTF-8: {:?}",
                        String::from_utf8_lossy(e.as_bytes())
                    ),
                }
            }
            Err(e) => {
                error!(target: "wire", "Failed to read input: {}", e);
                break;
            }
        }
    }
}

async fn write_lines<W>(mut writer: W, mut rx: UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        trace!(target: "wire", "out: {}", line);
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            error!(target: "wire", "Failed to write output: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_parse_identity() {
        let id = Identity::parse("alice;|alice pifon-bot pifon None").unwrap();
        assert_eq!(id.nick, "alice");
        assert_eq!(id.program, "pifon-bot");
        assert_eq!(id.config_name, "pifon");
        assert_eq!(id.config_path, None);

        let id = Identity::parse("alice;|alice mon cfg /etc/pifon.toml").unwrap();
        assert_eq!(id.config_path, Some(PathBuf::from("/etc/pifon.toml")));
    }

    #[test]
    fn test_parse_identity_errors() {
        assert!(matches!(
            Identity::parse("alice;|alice pifon"),
            Err(HandshakeError::Tokens(_))
        ));
        assert!(matches!(
            Identity::parse("garbage"),
            Err(HandshakeError::Decode(DecodeError::MissingPipe))
        ));
    }

    #[test]
    fn test_identity_line_round_trip() {
        let mut id = Identity::new("alice", "pifon");
        id.config_path = Some(PathBuf::from("/tmp/my config.toml"));
        assert_eq!(Identity::parse(&id.to_line()).unwrap(), id);
    }

    #[tokio::test]
    async fn test_pair_handshake() {
        let (mut transport, mut peer) = Transport::pair();
        assert!(peer.send("bob;|bob pifon-bot pifon None"));
        let id = transport.handshake().await.unwrap();
        assert_eq!(id.nick, "bob");

        transport.send("bob;|hello".to_string()).unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("bob;|hello"));

        drop(peer);
        assert!(transport.recv().await.is_none());
        assert_eq!(transport.send("x".to_string()), Err(TransportClosed));
    }

    #[tokio::test]
    async fn test_io_skips_lines_that_are_not_utf8() {
        let input: &'static [u8] = b"bob;|a\r\n\xff\xfe oops\nbob;|b\n";
        let (output, mut room) = tokio::io::duplex(256);
        let mut transport = Transport::from_io(input, output);

        assert_eq!(transport.recv().await.as_deref(), Some("bob;|a"));
        assert_eq!(transport.recv().await.as_deref(), Some("bob;|b"));
        assert!(transport.recv().await.is_none());

        transport.send("alice;|hi".to_string()).unwrap();
        let mut buf = [0u8; 10];
        room.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"alice;|hi\n");
    }

    #[tokio::test]
    async fn test_handshake_closed() {
        let (mut transport, peer) = Transport::pair();
        drop(peer);
        assert!(matches!(
            transport.handshake().await,
            Err(HandshakeError::Closed)
        ));
    }
}
