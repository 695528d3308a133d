//! The task that drives a [`Session`].
//!
//! One loop owns the session and waits on two sources: requests from the
//! host, and [`LoopEvent`]s posted by the helper tasks it spawns (helper
//! launch, agent connect, agent reader, evaluation timers). Outgoing traffic
//! is written by dedicated writer tasks fed through channels, so the loop
//! itself never blocks on I/O.

use std::io;

use dap::{HostReader, HostWriter, Message, Outgoing};
use eyre::WrapErr;
use futures::{SinkExt, StreamExt};
use launcher::Launched;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use wire::{AgentCodec, AgentReader, AgentWriter, EvalId};

use crate::{
    config::SessionConfig,
    session::{Action, PendingEvaluation, Session},
};

/// Completions reported back to the loop by spawned tasks.
#[derive(Debug)]
enum LoopEvent {
    Launched(eyre::Result<Launched>),
    Connected(io::Result<TcpStream>),
    AgentMessage(wire::Message),
    AgentClosed(Option<String>),
    EvaluationExpired(EvalId),
}

/// Serve one debug session over the given host streams until the host
/// disconnects or closes its side.
pub async fn run<R, W>(
    mut reader: HostReader<R>,
    writer: HostWriter<W>,
    config: SessionConfig,
) -> eyre::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let cancel = CancellationToken::new();
    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let writer_handle = spawn_host_writer(writer, host_rx);
    let codec = AgentCodec::with_max_size(config.max_frame_size);

    let mut session = Session::new(config, host_tx.clone());

    loop {
        tokio::select! {
            message = reader.next() => {
                let request = match message {
                    Some(Ok(Message::Request(request))) => request,
                    Some(Ok(other)) => {
                        tracing::warn!(?other, "ignoring non-request message from host");
                        continue;
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "host transport error");
                        break;
                    }
                    None => {
                        tracing::debug!("host closed its stream");
                        break;
                    }
                };

                match session.handle_request(request) {
                    Action::None => {}
                    Action::Launch { helper, timeout } => {
                        let event_tx = event_tx.clone();
                        tokio::spawn(async move {
                            let result = launcher::launch(&helper, timeout).await;
                            let _ = event_tx.send(LoopEvent::Launched(result));
                        });
                    }
                    Action::Await(pending) => {
                        spawn_evaluation_waiter(pending, host_tx.clone(), event_tx.clone());
                    }
                    Action::Exit => {
                        tracing::debug!("host disconnected");
                        break;
                    }
                }
            }
            Some(event) = event_rx.recv() => match event {
                LoopEvent::Launched(result) => {
                    if let Some(port) = session.on_launched(result) {
                        let event_tx = event_tx.clone();
                        tokio::spawn(async move {
                            tracing::debug!(port, "connecting to agent");
                            let result = TcpStream::connect(("127.0.0.1", port)).await;
                            let _ = event_tx.send(LoopEvent::Connected(result));
                        });
                    }
                }
                LoopEvent::Connected(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "could not disable nagle");
                    }
                    let (agent_reader, agent_writer) = wire::split(stream, codec.clone());
                    let (agent_tx, agent_rx) = mpsc::unbounded_channel();
                    if session.on_connected(agent_tx) {
                        spawn_agent_writer(agent_writer, agent_rx, event_tx.clone());
                        spawn_agent_reader(agent_reader, event_tx.clone(), cancel.child_token());
                    }
                }
                LoopEvent::Connected(Err(e)) => session.on_connect_failed(e),
                LoopEvent::AgentMessage(message) => session.handle_agent_message(message),
                LoopEvent::AgentClosed(reason) => session.on_agent_closed(reason),
                LoopEvent::EvaluationExpired(eval_id) => session.forget_evaluation(eval_id),
            },
        }
    }

    cancel.cancel();
    // the writer exits once every sender is gone and the queue is drained
    drop(session);
    drop(host_tx);
    writer_handle.await.wrap_err("joining host writer")?;
    Ok(())
}

fn spawn_host_writer<W>(
    mut writer: HostWriter<W>,
    mut host_rx: mpsc::UnboundedReceiver<Outgoing>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut seq = 0;
        while let Some(outgoing) = host_rx.recv().await {
            seq += 1;
            let message = match outgoing.into_message(seq) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(error = %e, "could not serialize host message");
                    continue;
                }
            };
            tracing::trace!(?message, "sending to host");
            if let Err(e) = writer.send(message).await {
                tracing::error!(error = %e, "writing to host failed");
                break;
            }
        }
        tracing::debug!("host writer finished");
    })
}

fn spawn_evaluation_waiter(
    pending: PendingEvaluation,
    host_tx: mpsc::UnboundedSender<Outgoing>,
    event_tx: mpsc::UnboundedSender<LoopEvent>,
) {
    tokio::spawn(async move {
        let outcome = pending.wait().await;
        if let Some(eval_id) = outcome.expired {
            let _ = event_tx.send(LoopEvent::EvaluationExpired(eval_id));
        }
        let _ = host_tx.send(outcome.reply.into());
    });
}

fn spawn_agent_writer<W>(
    mut writer: AgentWriter<W>,
    mut agent_rx: mpsc::UnboundedReceiver<wire::Message>,
    event_tx: mpsc::UnboundedSender<LoopEvent>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = agent_rx.recv().await {
            if let Err(e) = writer.send(message).await {
                tracing::error!(error = %e, "writing to agent failed");
                let _ = event_tx.send(LoopEvent::AgentClosed(Some(e.to_string())));
                return;
            }
        }
        // dropping the writer closes our half of the socket
        tracing::debug!("agent writer finished");
    });
}

fn spawn_agent_reader<R>(
    mut reader: AgentReader<R>,
    event_tx: mpsc::UnboundedSender<LoopEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("agent reader cancelled");
                    break;
                }
                message = reader.next() => {
                    match message {
                        Some(Ok(message)) => {
                            tracing::debug!(kind = message.kind_id(), "received agent message");
                            if event_tx.send(LoopEvent::AgentMessage(message)).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "agent transport error");
                            let _ = event_tx.send(LoopEvent::AgentClosed(Some(e.to_string())));
                            break;
                        }
                        None => {
                            tracing::debug!("agent closed the connection");
                            let _ = event_tx.send(LoopEvent::AgentClosed(None));
                            break;
                        }
                    }
                }
            }
        }
    });
}
