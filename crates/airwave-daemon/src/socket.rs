use crate::BroadcastMessage;
use airwave_proto::protocol::{Broadcast, Command, Message, SessionState, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Largest command frame a client may send.
const MAX_FRAME_LEN: usize = 64 * 1024;

pub fn start_server(
    bind_address: String,
    port: u16,
    state_rx: watch::Receiver<SessionState>,
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);

        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let state_rx = state_rx.clone();
                    let command_tx = command_tx.clone();
                    let bcast_rx = broadcast_tx.subscribe();

                    tokio::spawn(async move {
                        handle_client(stream, id, state_rx, command_tx, bcast_rx).await;
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    client_id: usize,
    mut state_rx: watch::Receiver<SessionState>,
    command_tx: mpsc::Sender<Command>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Hello with the current snapshot on connect
    let hello = {
        let state = state_rx.borrow_and_update().clone();
        Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            rev: state.rev,
            state,
        }
    };
    if send(&mut write_half, hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        debug!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        while read_buf.len() >= 4 {
                            if frame_too_long(&read_buf) {
                                warn!(
                                    "Client {} sent a frame over {} bytes, disconnecting",
                                    client_id, MAX_FRAME_LEN
                                );
                                return;
                            }
                            match Message::decode(&read_buf) {
                                Ok((Message::Command(cmd), consumed)) => {
                                    read_buf.drain(..consumed);
                                    debug!("Client {} sent command: {:?}", client_id, cmd);
                                    if command_tx.send(cmd).await.is_err() {
                                        warn!("Command channel closed");
                                        return;
                                    }
                                }
                                Ok((_, consumed)) => {
                                    read_buf.drain(..consumed);
                                }
                                Err(e) => {
                                    let Some(len) = complete_frame_len(&read_buf) else {
                                        break; // wait for more bytes
                                    };
                                    warn!("Client {} sent malformed frame: {}", client_id, e);
                                    read_buf.drain(..len);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let data = state_rx.borrow_and_update().clone();
                if send(&mut write_half, Broadcast::State { data }).await.is_err() {
                    break;
                }
            }

            msg = broadcast_rx.recv() => {
                let broadcast = match msg {
                    Ok(BroadcastMessage::Notice(message)) => Broadcast::Notice { message },
                    Ok(BroadcastMessage::Log(message)) => Broadcast::Log { message },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        continue;
                    }
                    Err(_) => break,
                };
                if send(&mut write_half, broadcast).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn send(write_half: &mut OwnedWriteHalf, broadcast: Broadcast) -> anyhow::Result<()> {
    let encoded = Message::Broadcast(broadcast).encode()?;
    write_half.write_all(&encoded).await?;
    Ok(())
}

fn frame_too_long(buf: &[u8]) -> bool {
    buf.get(..4)
        .and_then(|h| <[u8; 4]>::try_from(h).ok())
        .is_some_and(|h| u32::from_be_bytes(h) as usize > MAX_FRAME_LEN)
}

/// Total length of the first frame in `buf`, if all of it has arrived.
fn complete_frame_len(buf: &[u8]) -> Option<usize> {
    let header: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    let total = 4 + u32::from_be_bytes(header) as usize;
    (buf.len() >= total).then_some(total)
}
