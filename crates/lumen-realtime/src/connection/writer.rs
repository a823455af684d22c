//! Outbound writer task of a connection.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use lumen_core::config::RealtimeConfig;

use super::handle::{CloseReason, ConnectionHandle};
use crate::message::OutboundFrame;

/// Timing of the writer task.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// How long queued frames may still be flushed on shutdown.
    pub drain_grace: Duration,
}

impl From<&RealtimeConfig> for WriterConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            drain_grace: config.drain_grace(),
        }
    }
}

/// Forward queued frames to the socket in FIFO order until the
/// connection closes, pinging on a fixed interval.
///
/// On process shutdown the frames still queued are flushed for at most
/// the drain grace before the close frame; any other close reason drops
/// them.
pub async fn pump_outbound<S>(
    handle: Arc<ConnectionHandle>,
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut sink: S,
    config: WriterConfig,
) where
    S: Sink<OutboundFrame> + Unpin,
{
    let mut ping = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = handle.closed() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(frame).await.is_err() {
                    handle.close(CloseReason::ClientClosed);
                    return;
                }
            }
            _ = ping.tick() => {
                if sink.send(OutboundFrame::Ping).await.is_err() {
                    handle.close(CloseReason::ClientClosed);
                    return;
                }
            }
        }
    }

    let reason = handle.close_reason().unwrap_or(CloseReason::ClientClosed);
    if reason == CloseReason::Shutdown {
        let drained = time::timeout(config.drain_grace, async {
            let mut flushed = 0usize;
            while let Ok(frame) = rx.try_recv() {
                if sink.send(frame).await.is_err() {
                    break;
                }
                flushed += 1;
            }
            flushed
        })
        .await;
        match drained {
            Ok(flushed) => debug!(conn_id = %handle.id, flushed, "Drained outbound queue"),
            Err(_) => debug!(conn_id = %handle.id, "Drain grace elapsed"),
        }
    }

    let _ = sink.send(OutboundFrame::Close(reason.as_str().to_string())).await;
    let _ = sink.close().await;
    debug!(conn_id = %handle.id, reason = %reason, "Writer finished");
}
