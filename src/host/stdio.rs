//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `InboundEnvelope` messages from stdin,
//! dispatches them through the `HostCommandServer` router, and writes
//! `ReplyEnvelope` and `EventEnvelope` messages as newline-delimited JSON to
//! stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::BridgeConfig;
use crate::error::{PluginError, Result};
use crate::host::channel::{HostCommandClient, HostHandler, command_channel_with_events};
use crate::host::contract::{EventEnvelope, InboundEnvelope, ReplyEnvelope};
use crate::reply::MethodError;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinSet;

type SharedWriter = Arc<Mutex<BufWriter<tokio::io::Stdout>>>;

/// Run the stdin/stdout JSON bridge until stdin closes.
///
/// Three kinds of task run concurrently:
///
/// 1. **Reader** -- reads newline-delimited JSON from stdin and submits each
///    envelope through the host command client. Each method call gets its
///    own task, because an `enableBluetooth` reply only arrives after a
///    later `activity_result` line has been read.
/// 2. **Event forwarder** -- receives broadcast `EventEnvelope` messages and
///    writes them as JSON lines to stdout.
/// 3. **Server** -- runs the `HostCommandServer` router loop.
///
/// On EOF the bridge detaches the activity, which abandons any pending
/// request, waits for every outstanding reply to be written and exits.
pub async fn run_stdio_bridge<H: HostHandler>(
    handler: H,
    event_tx: broadcast::Sender<EventEnvelope>,
    config: &BridgeConfig,
) -> Result<()> {
    let (client, server) = command_channel_with_events(config.request_capacity, event_tx, handler);

    let stdout = tokio::io::stdout();
    let writer: SharedWriter = Arc::new(Mutex::new(BufWriter::new(stdout)));

    // Spawn the command-router server task.
    let server_handle = tokio::spawn(async move {
        server.run().await;
    });

    // Spawn the event forwarder task.
    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut *w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope to stdout; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "failed to serialize event envelope; skipping"
                        );
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        lagged = n,
                        "event forwarder lagged; some events were dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let reader_result = run_reader(stdin, client, Arc::clone(&writer)).await;

    // Reader finished and dropped the client, which closes the request
    // channel and lets the server exit.
    let _ = server_handle.await;
    event_handle.abort();
    let _ = event_handle.await;

    reader_result
}

/// Read newline-delimited envelopes from `reader`, dispatch each one, and
/// write replies.
///
/// Every envelope is submitted to the server from this task, in input
/// order. Only the wait for a method call's reply runs on its own task.
async fn run_reader<R, W>(
    mut reader: R,
    client: HostCommandClient,
    writer: Arc<Mutex<W>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut line = String::new();
    let mut calls = JoinSet::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| PluginError::Channel(format!("failed to read from stdin: {e}")))?;

        // EOF
        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down stdio bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: InboundEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse inbound envelope from stdin"
                );
                let error_reply = ReplyEnvelope::error(
                    "parse-error",
                    MethodError::new(
                        "parse_error",
                        format!("failed to parse inbound envelope: {e}"),
                    ),
                );
                let mut w = writer.lock().await;
                write_reply(&mut *w, &error_reply).await?;
                continue;
            }
        };

        match envelope {
            InboundEnvelope::Call(call) => {
                let request_id = call.request_id.clone();
                let pending = match client.submit(InboundEnvelope::Call(call)).await {
                    Ok(pending) => pending,
                    Err(e) => {
                        tracing::error!(error = %e, "host call dispatch failed");
                        let reply = dispatch_error(request_id, &e);
                        let mut w = writer.lock().await;
                        write_reply(&mut *w, &reply).await?;
                        continue;
                    }
                };
                let writer = Arc::clone(&writer);
                calls.spawn(async move {
                    let reply = match pending.wait().await {
                        Ok(Some(reply)) => reply,
                        Ok(None) => dispatch_error(
                            request_id,
                            &PluginError::Bridge("no reply produced for call".to_owned()),
                        ),
                        Err(e) => {
                            tracing::error!(error = %e, "host call dispatch failed");
                            dispatch_error(request_id, &e)
                        }
                    };
                    let mut w = writer.lock().await;
                    if let Err(e) = write_reply(&mut *w, &reply).await {
                        tracing::warn!(error = %e, "failed to write reply to stdout");
                    }
                });
            }
            callback => {
                if let Err(e) = client.send(callback).await {
                    tracing::error!(error = %e, "host callback dispatch failed");
                }
            }
        }

        // Reap finished call tasks so the set does not grow without bound.
        while calls.try_join_next().is_some() {}
    }

    if let Err(e) = client.send(InboundEnvelope::Detach).await {
        tracing::warn!(error = %e, "failed to detach on shutdown");
    }
    while calls.join_next().await.is_some() {}

    Ok(())
}

fn dispatch_error(request_id: String, err: &PluginError) -> ReplyEnvelope {
    ReplyEnvelope::error(
        request_id,
        MethodError::new("dispatch_error", format!("dispatch failed: {err}")),
    )
}

async fn write_reply<W>(writer: &mut W, reply: &ReplyEnvelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(reply)
        .map_err(|e| PluginError::Bridge(format!("failed to serialize reply envelope: {e}")))?;
    write_line(writer, &json).await
}

/// Write a single JSON line to the writer and flush.
async fn write_line<W>(writer: &mut W, json: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| PluginError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| PluginError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| PluginError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
