//! Command channel to the remote game server.
//!
//! Each call opens its own RCON connection, logs in, sends one command, reads
//! its reply and closes. There is no pooling and no retry.
//!
//! Servers split replies longer than one packet into several response packets
//! with the command's id. The command is followed by an empty response-type
//! packet with its own id; the server answers it only after the last
//! fragment, so its echo marks the end of the reply.

mod packet;

use crate::error::ChannelError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Send one textual command and return the raw reply.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn send(&self, command: &str) -> Result<String, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Upper bound on connect + login + command + reply.
    pub timeout: Duration,
}

pub struct RconChannel {
    cfg: RconConfig,
}

impl RconChannel {
    pub fn new(cfg: RconConfig) -> Self {
        Self { cfg }
    }

    async fn exchange(&self, command: &str) -> Result<String, ChannelError> {
        let addr = format!("{}:{}", self.cfg.host, self.cfg.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ChannelError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let login_id = next_request_id();
        stream
            .write_all(&packet::encode(login_id, packet::TYPE_LOGIN, &self.cfg.password))
            .await?;
        let auth = packet::read_packet(&mut stream).await?;
        if auth.request_id == -1 {
            return Err(ChannelError::AuthRejected);
        }
        if auth.request_id != login_id {
            return Err(ChannelError::Protocol(format!(
                "login reply id {} does not match request {login_id}",
                auth.request_id
            )));
        }

        let command_id = next_request_id();
        let end_marker_id = command_id.checked_add(1).unwrap_or(1);
        stream
            .write_all(&packet::encode(command_id, packet::TYPE_COMMAND, command))
            .await?;
        stream
            .write_all(&packet::encode(end_marker_id, packet::TYPE_RESPONSE, ""))
            .await?;

        let mut reply = String::new();
        loop {
            let fragment = packet::read_packet(&mut stream).await?;
            if fragment.request_id == end_marker_id {
                break;
            }
            if fragment.request_id != command_id {
                return Err(ChannelError::Protocol(format!(
                    "reply id {} does not match request {command_id}",
                    fragment.request_id
                )));
            }
            if fragment.kind != packet::TYPE_RESPONSE {
                return Err(ChannelError::Protocol(format!(
                    "unexpected reply type {}",
                    fragment.kind
                )));
            }
            reply.push_str(&fragment.payload);
        }

        let _ = stream.shutdown().await;
        Ok(reply)
    }
}

#[async_trait]
impl CommandChannel for RconChannel {
    async fn send(&self, command: &str) -> Result<String, ChannelError> {
        validate_command(command)?;
        tracing::debug!(host = %self.cfg.host, port = self.cfg.port, command, "sending rcon command");

        match tokio::time::timeout(self.cfg.timeout, self.exchange(command)).await {
            Ok(Ok(reply)) => {
                tracing::debug!(reply = %reply, "rcon reply");
                Ok(reply)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, command, "rcon command failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.cfg.timeout, command, "rcon command timed out");
                Err(ChannelError::Timeout(self.cfg.timeout))
            }
        }
    }
}

/// Commands are single lines without protocol terminators.
fn validate_command(command: &str) -> Result<(), ChannelError> {
    if command.is_empty() {
        return Err(ChannelError::InvalidCommand("empty command".into()));
    }
    if command.contains(['\0', '\r', '\n']) {
        return Err(ChannelError::InvalidCommand(
            "command contains a line break or NUL byte".into(),
        ));
    }
    if command.len() > packet::MAX_COMMAND_LEN {
        return Err(ChannelError::InvalidCommand(format!(
            "command is {} bytes, limit is {}",
            command.len(),
            packet::MAX_COMMAND_LEN
        )));
    }
    Ok(())
}

/// Positive ids only; -1 is reserved for the server's auth failure reply.
fn next_request_id() -> i32 {
    (rand::random::<u32>() >> 1).max(1) as i32
}

#[cfg(test)]
mod tests {
    use super::packet::{encode, read_packet, TYPE_COMMAND, TYPE_LOGIN, TYPE_RESPONSE};
    use super::*;
    use tokio::net::TcpListener;

    const PASSWORD: &str = "hunter2";

    fn channel(port: u16, timeout: Duration) -> RconChannel {
        RconChannel::new(RconConfig {
            host: "127.0.0.1".into(),
            port,
            password: PASSWORD.into(),
            timeout,
        })
    }

    /// Minimal RCON server: accepts one connection, checks the password and
    /// answers the command with `reply`, split into packet-sized fragments
    /// like a Minecraft server does. Returns the command it received.
    async fn spawn_server(reply: String) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let login = read_packet(&mut sock).await.unwrap();
            assert_eq!(login.kind, TYPE_LOGIN);
            let auth_id = if login.payload == PASSWORD {
                login.request_id
            } else {
                -1
            };
            sock.write_all(&encode(auth_id, TYPE_COMMAND, ""))
                .await
                .unwrap();
            if auth_id == -1 {
                return String::new();
            }
            let cmd = read_packet(&mut sock).await.unwrap();
            assert_eq!(cmd.kind, TYPE_COMMAND);
            let marker = read_packet(&mut sock).await.unwrap();
            assert_eq!(marker.kind, TYPE_RESPONSE);
            assert_ne!(marker.request_id, cmd.request_id);

            let fragments: Vec<&[u8]> = if reply.is_empty() {
                vec![&b""[..]]
            } else {
                reply.as_bytes().chunks(packet::MAX_REPLY_LEN).collect()
            };
            for fragment in fragments {
                let text = std::str::from_utf8(fragment).unwrap();
                sock.write_all(&encode(cmd.request_id, TYPE_RESPONSE, text))
                    .await
                    .unwrap();
            }
            sock.write_all(&encode(marker.request_id, TYPE_RESPONSE, "Unknown request 0"))
                .await
                .unwrap();
            cmd.payload
        });
        (port, handle)
    }

    #[tokio::test]
    async fn returns_reply_verbatim() {
        let (port, server) = spawn_server("Saved replay to: run1_2024.mcrr".into()).await;
        let reply = channel(port, Duration::from_secs(5))
            .send("replay stop chunks named run1")
            .await
            .unwrap();
        assert_eq!(reply, "Saved replay to: run1_2024.mcrr");
        assert_eq!(server.await.unwrap(), "replay stop chunks named run1");
    }

    #[tokio::test]
    async fn long_reply_is_reassembled_from_fragments() {
        let long = format!(
            "{}{}tail",
            "a".repeat(packet::MAX_REPLY_LEN),
            "b".repeat(packet::MAX_REPLY_LEN)
        );
        let (port, _server) = spawn_server(long.clone()).await;
        let reply = channel(port, Duration::from_secs(5))
            .send("replay list chunks")
            .await
            .unwrap();
        assert_eq!(reply.len(), long.len());
        assert_eq!(reply, long);
    }

    #[tokio::test]
    async fn wrong_password_is_auth_rejected() {
        let (port, _server) = spawn_server("unused".into()).await;
        let mut ch = channel(port, Duration::from_secs(5));
        ch.cfg.password = "wrong".into();
        let err = ch.send("list").await.unwrap_err();
        assert!(matches!(err, ChannelError::AuthRejected), "{err}");
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(sock);
        });
        let err = channel(port, Duration::from_millis(200))
            .send("list")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)), "{err}");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = channel(port, Duration::from_secs(5))
            .send("list")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Connect { .. }), "{err}");
    }

    #[tokio::test]
    async fn multi_line_commands_never_leave_the_process() {
        // Port 9 is never contacted: validation fails first.
        let ch = channel(9, Duration::from_secs(5));
        for bad in ["a\nb", "a\rb", "a\0b", ""] {
            let err = ch.send(bad).await.unwrap_err();
            assert!(matches!(err, ChannelError::InvalidCommand(_)), "{bad:?}");
        }
        let long = "x".repeat(packet::MAX_COMMAND_LEN + 1);
        assert!(matches!(
            ch.send(&long).await.unwrap_err(),
            ChannelError::InvalidCommand(_)
        ));
    }
}
