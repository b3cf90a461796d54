//! TCP service: accepts station connections and runs the message loop.
//!
//! One reader task per connection. All dispatch decisions go through a
//! single coarse `tokio::sync::Mutex` around the engine, so decisions are
//! serialised no matter how many stations are connected; only frame I/O
//! suspends. Messages on one connection are handled in arrival order.

use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::dispatch::DispatchEngine;
use crate::error::MesResult;
use crate::protocol::{
    read_frame, write_frame, ActionQuery, Frame, MSG_STATION_ACTION_DONE_QUERY,
    MSG_STATION_ACTION_QUERY, MSG_STATION_ACTION_RSP,
};

/// The MES dispatch service.
pub struct MesServer {
    listener: TcpListener,
    engine: Arc<Mutex<DispatchEngine>>,
}

impl MesServer {
    /// Bind the service. Port 0 asks the OS for a free port (used by
    /// tests); [`local_addr`](Self::local_addr) reports the actual one.
    pub async fn bind(engine: DispatchEngine, port: u16) -> MesResult<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self {
            listener,
            engine: Arc::new(Mutex::new(engine)),
        })
    }

    /// The address the service listens on.
    pub fn local_addr(&self) -> MesResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the engine (used by startup code and tests).
    pub fn engine(&self) -> Arc<Mutex<DispatchEngine>> {
        Arc::clone(&self.engine)
    }

    /// Accept and serve connections until the task is cancelled.
    pub async fn serve(&self) -> MesResult<()> {
        info!("MES server listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            info!("station client {peer} connected");
            let engine = Arc::clone(&self.engine);
            tokio::spawn(async move {
                match handle_client(stream, engine).await {
                    Ok(()) => info!("station client {peer} disconnected"),
                    Err(e) => warn!("station client {peer} dropped: {e}"),
                }
            });
        }
    }
}

async fn handle_client(stream: TcpStream, engine: Arc<Mutex<DispatchEngine>>) -> MesResult<()> {
    let (mut reader, mut writer) = stream.into_split();
    while let Some(frame) = read_frame(&mut reader).await? {
        match frame.msg_type {
            MSG_STATION_ACTION_QUERY | MSG_STATION_ACTION_DONE_QUERY => {
                let qry = match ActionQuery::from_bytes(&frame.payload) {
                    Ok(qry) => qry,
                    Err(e) => {
                        error!("malformed query: {e}");
                        continue;
                    }
                };
                info!(
                    "{} received: workstation {}, tray {}",
                    if frame.msg_type == MSG_STATION_ACTION_QUERY {
                        "action query"
                    } else {
                        "action done query"
                    },
                    qry.workstation_id,
                    qry.tray_id
                );
                let rsp = {
                    let mut engine = engine.lock().await;
                    if frame.msg_type == MSG_STATION_ACTION_QUERY {
                        engine.on_action_query(&qry)
                    } else {
                        engine.on_action_done_query(&qry)
                    }
                };
                write_frame(
                    &mut writer,
                    &Frame {
                        msg_type: MSG_STATION_ACTION_RSP,
                        payload: rsp.to_bytes(),
                    },
                )
                .await?;
            }
            other => warn!("ignoring unknown message type {other:#06x}"),
        }
    }
    Ok(())
}
