//! Helpers for driving a whole session from tests.
//!
//! [`HostClient`] plays the IDE over in-memory streams and [`FakeAgent`]
//! plays the injected agent over a real TCP socket.

use std::{collections::VecDeque, io, time::Duration};

use dap::{DapCodec, HostReader, HostWriter, Message, Response, Seq};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    net::{
        TcpListener,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use wire::{AgentCodec, AgentReader, AgentWriter};

use crate::config::SessionConfig;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// The host side of a session running on in-memory streams.
pub struct HostClient {
    reader: HostReader<DuplexStream>,
    writer: HostWriter<DuplexStream>,
    seq: Seq,
    buffer: VecDeque<Message>,
}

impl HostClient {
    /// Spawn a session and connect a client to it.
    pub fn start(config: SessionConfig) -> (Self, JoinHandle<eyre::Result<()>>) {
        let (client_write, adapter_read) = tokio::io::duplex(64 * 1024);
        let (adapter_write, client_read) = tokio::io::duplex(64 * 1024);

        let handle = tokio::spawn(crate::run(
            FramedRead::new(adapter_read, DapCodec::new()),
            FramedWrite::new(adapter_write, DapCodec::new()),
            config,
        ));

        let client = Self {
            reader: FramedRead::new(client_read, DapCodec::new()),
            writer: FramedWrite::new(client_write, DapCodec::new()),
            seq: 0,
            buffer: VecDeque::new(),
        };
        (client, handle)
    }

    pub async fn send(&mut self, command: &str, arguments: Value) -> eyre::Result<Seq> {
        self.seq += 1;
        self.writer
            .send(dap::testing::request(self.seq, command, Some(arguments)))
            .await?;
        Ok(self.seq)
    }

    /// Send a request and wait for its response.
    pub async fn request(&mut self, command: &str, arguments: Value) -> eyre::Result<Response> {
        let seq = self.send(command, arguments).await?;
        self.response(seq).await
    }

    pub async fn response(&mut self, request_seq: Seq) -> eyre::Result<Response> {
        let message = self
            .wait_for(&format!("response to {request_seq}"), |message| {
                matches!(message, Message::Response(r) if r.request_seq == request_seq)
            })
            .await?;
        match message {
            Message::Response(response) => Ok(response),
            other => eyre::bail!("unexpected message {other:?}"),
        }
    }

    pub async fn event(&mut self, name: &str) -> eyre::Result<dap::Event> {
        let message = self
            .wait_for(&format!("{name} event"), |message| {
                matches!(message, Message::Event(e) if e.event == name)
            })
            .await?;
        match message {
            Message::Event(event) => Ok(event),
            other => eyre::bail!("unexpected message {other:?}"),
        }
    }

    /// Wait for an `output` event of the given category and return its text.
    pub async fn output(&mut self, category: &str) -> eyre::Result<String> {
        let message = self
            .wait_for(&format!("{category} output"), |message| {
                matches!(message, Message::Event(e)
                    if e.event == "output"
                        && e.body.as_ref().is_some_and(|body| body["category"] == category))
            })
            .await?;
        match message {
            Message::Event(event) => Ok(event
                .body
                .and_then(|body| body["output"].as_str().map(str::to_string))
                .unwrap_or_default()),
            other => eyre::bail!("unexpected message {other:?}"),
        }
    }

    /// Wait for a matching message, keeping the others for later calls.
    async fn wait_for<F>(&mut self, what: &str, pred: F) -> eyre::Result<Message>
    where
        F: Fn(&Message) -> bool,
    {
        if let Some(pos) = self.buffer.iter().position(&pred) {
            if let Some(message) = self.buffer.remove(pos) {
                return Ok(message);
            }
        }

        loop {
            let next = tokio::time::timeout(WAIT_TIMEOUT, self.reader.next())
                .await
                .map_err(|_| eyre::eyre!("timed out waiting for {what}"))?;
            let message = match next {
                Some(message) => message?,
                None => eyre::bail!("adapter closed while waiting for {what}"),
            };
            if pred(&message) {
                tracing::debug!(?message, "received expected message");
                return Ok(message);
            }
            tracing::trace!(?message, "buffering message");
            self.buffer.push_back(message);
        }
    }
}

/// A TCP listener standing in for the injected agent.
pub struct FakeAgent {
    listener: TcpListener,
}

impl FakeAgent {
    pub async fn bind() -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind("127.0.0.1:0").await?,
        })
    }

    pub fn port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    pub async fn accept(&self) -> eyre::Result<AgentConnection> {
        let (stream, _) = tokio::time::timeout(WAIT_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| eyre::eyre!("timed out waiting for the adapter to connect"))??;
        let (reader, writer) = wire::split(stream, AgentCodec::new());
        Ok(AgentConnection { reader, writer })
    }
}

/// The agent's end of an accepted adapter connection.
pub struct AgentConnection {
    reader: AgentReader<OwnedReadHalf>,
    writer: AgentWriter<OwnedWriteHalf>,
}

impl AgentConnection {
    pub async fn send(&mut self, message: wire::Message) -> eyre::Result<()> {
        self.writer.send(message).await?;
        Ok(())
    }

    /// Write bytes straight to the socket, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> eyre::Result<()> {
        let socket = self.writer.get_mut();
        socket.write_all(bytes).await?;
        socket.flush().await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> eyre::Result<wire::Message> {
        match tokio::time::timeout(WAIT_TIMEOUT, self.reader.next()).await {
            Ok(Some(message)) => Ok(message?),
            Ok(None) => eyre::bail!("adapter closed the agent connection"),
            Err(_) => eyre::bail!("timed out waiting for an agent message"),
        }
    }

    /// Wait until the adapter closes the connection.
    pub async fn closed(&mut self) -> eyre::Result<()> {
        loop {
            match tokio::time::timeout(WAIT_TIMEOUT, self.reader.next()).await {
                Ok(None) | Ok(Some(Err(_))) => return Ok(()),
                Ok(Some(Ok(message))) => tracing::debug!(?message, "draining agent message"),
                Err(_) => eyre::bail!("timed out waiting for the adapter to disconnect"),
            }
        }
    }
}

/// Write an executable helper script announcing `port`.
#[cfg(unix)]
pub fn fake_helper(dir: &std::path::Path, port: u16) -> io::Result<std::path::PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("emmy-helper.sh");
    std::fs::write(
        &path,
        format!("#!/bin/sh\necho \"injecting into $4\"\necho port:{port}\n"),
    )?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms)?;
    Ok(path)
}
