use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use todo_store::{CreateTodo, RemoteStore, StoreError, TodoRef, UpdateTodo};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::{read_frame, write_frame};
use crate::protocol::{codes, methods, RpcError, RpcRequest, RpcResponse, ServerFrame};

/// Frames queued for one connection before request handlers wait.
const OUTBOUND_QUEUE: usize = 64;

/// How long responses still in flight may take to flush after the peer stops
/// sending.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Serves a [`RemoteStore`] over length-prefixed msgpack frames.
///
/// Each connection may pipeline requests; responses carry the request id and
/// can arrive out of order. After a `subscribe` request, store events are
/// interleaved with responses on the same connection.
#[derive(Clone)]
pub struct RpcServer {
    store: Arc<dyn RemoteStore>,
}

impl RpcServer {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            self.spawn_connection(stream, peer_addr);
        }
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = accepted?;
                    self.spawn_connection(stream, peer_addr);
                }
                () = &mut shutdown => {
                    log::info!("rpc server shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        log::debug!("rpc connection opened peer={peer_addr}");
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(err) = server.handle_connection(stream).await {
                log::warn!("rpc connection error peer={peer_addr} err={err}");
            }
            log::debug!("rpc connection closed peer={peer_addr}");
        });
    }

    async fn handle_connection(&self, stream: TcpStream) -> io::Result<()> {
        let (mut reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_QUEUE);
        let mut writer_task = tokio::spawn(write_loop(writer, out_rx));
        let mut forwarder: Option<JoinHandle<()>> = None;

        let result = loop {
            let request: RpcRequest = match read_frame(&mut reader).await {
                Ok(Some(request)) => request,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };

            if request.method == methods::SUBSCRIBE {
                let response = if forwarder.is_some() {
                    RpcResponse::ok(request.id, JsonValue::Bool(true))
                } else {
                    match self.spawn_event_forwarder(out_tx.clone()).await {
                        Ok(handle) => {
                            forwarder = Some(handle);
                            RpcResponse::ok(request.id, JsonValue::Bool(true))
                        }
                        Err(err) => {
                            log::warn!("rpc subscribe failed: {err}");
                            RpcResponse::err(request.id, RpcError::from(&err))
                        }
                    }
                };
                if out_tx.send(ServerFrame::Response(response)).await.is_err() {
                    break Ok(());
                }
                continue;
            }

            let server = self.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let response = server.dispatch(request).await;
                let _ = out_tx.send(ServerFrame::Response(response)).await;
            });
        };

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        // The writer ends once every in-flight dispatch has sent its response.
        drop(out_tx);
        if tokio::time::timeout(WRITER_GRACE, &mut writer_task)
            .await
            .is_err()
        {
            log::debug!("rpc writer did not drain in time, dropping queued frames");
            writer_task.abort();
        }
        result
    }

    async fn spawn_event_forwarder(
        &self,
        out_tx: mpsc::Sender<ServerFrame>,
    ) -> Result<JoinHandle<()>, StoreError> {
        let mut events = self.store.subscribe().await?;
        Ok(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if out_tx.send(ServerFrame::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("rpc subscriber lagged, {skipped} event(s) dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Run one request against the store.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        let result = match request.method.as_str() {
            methods::LIST => reply(self.store.list().await),
            methods::CREATE => match params::<CreateTodo>(request.params) {
                Ok(params) => reply(self.store.create(params).await),
                Err(err) => Err(err),
            },
            methods::UPDATE => match params::<UpdateTodo>(request.params) {
                Ok(params) => reply(self.store.update(params).await),
                Err(err) => Err(err),
            },
            methods::TOGGLE => match params::<TodoRef>(request.params) {
                Ok(params) => reply(self.store.toggle(params.id).await),
                Err(err) => Err(err),
            },
            methods::DELETE => match params::<TodoRef>(request.params) {
                Ok(params) => reply(self.store.delete(params.id).await),
                Err(err) => Err(err),
            },
            other => Err(RpcError::new(
                codes::UNKNOWN_METHOD,
                format!("unknown method: {other}"),
            )),
        };
        match result {
            Ok(value) => RpcResponse::ok(id, value),
            Err(error) => {
                log::debug!("rpc request {id} failed: {} {}", error.code, error.message);
                RpcResponse::err(id, error)
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut frames: mpsc::Receiver<ServerFrame>) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = write_frame(&mut writer, &frame).await {
            log::warn!("rpc write failed: {err}");
            break;
        }
    }
}

fn params<T: DeserializeOwned>(params: Option<JsonValue>) -> Result<T, RpcError> {
    let params = params.unwrap_or(JsonValue::Null);
    serde_json::from_value(params)
        .map_err(|err| RpcError::new(codes::VALIDATION, format!("invalid params: {err}")))
}

fn reply<T: Serialize>(result: Result<T, StoreError>) -> Result<JsonValue, RpcError> {
    let value = result.map_err(|err| RpcError::from(&err))?;
    serde_json::to_value(value).map_err(|err| RpcError::new(codes::INTERNAL, err.to_string()))
}
