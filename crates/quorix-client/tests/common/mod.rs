//! In-memory backend serving the list and counter services over a local
//! socket.
//!
//! Each partition is a separate server with its own state. Stream positions
//! follow the protocol the client expects: a listener's stream id is the
//! sequence number of its `Events` request, every event on a listener advances
//! that listener's index, events caused by the listener's own session carry
//! the new index, and every response to that session reports the indexes of
//! all its listeners.

#![allow(dead_code)]

use core::{pin::Pin, time::Duration};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use quorix_client::{Client, ClientConfig};
use quorix_core::{
    SessionId, StreamId,
    proto::{
        counter::{self, counter_service_server::{CounterService, CounterServiceServer}},
        headers::{Header, PrimitiveId, StreamHeader},
        list::{
            self, EventResponse, EventType, IterateResponse,
            list_service_server::{ListService, ListServiceServer},
        },
    },
};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::{
    Stream,
    wrappers::{TcpListenerStream, UnboundedReceiverStream},
};
use tonic::{
    Request, Response, Status,
    transport::{Channel, Endpoint, Server},
};

type EventSender = mpsc::UnboundedSender<Result<EventResponse, Status>>;

struct SessionRecord {
    primitive: String,
    client_id: String,
}

struct Listener {
    session_id: SessionId,
    primitive: String,
    stream_id: StreamId,
    index: u64,
    tx: EventSender,
}

#[derive(Default)]
struct State {
    last_session: SessionId,
    sessions: HashMap<SessionId, SessionRecord>,
    lists: HashMap<String, Vec<String>>,
    counters: HashMap<String, i64>,
    listeners: Vec<Listener>,
}

impl State {
    fn open(&mut self, id: Option<PrimitiveId>, client_id: String) -> Result<SessionId, Status> {
        let id = id.ok_or_else(|| Status::invalid_argument("missing primitive id"))?;
        if id.name.is_empty() {
            return Err(Status::invalid_argument("empty primitive name"));
        }
        self.last_session += 1;
        self.sessions.insert(
            self.last_session,
            SessionRecord {
                primitive: id.to_string(),
                client_id,
            },
        );
        Ok(self.last_session)
    }

    /// Resolves the session a request was issued on.
    fn session(&self, header: Option<&Header>) -> Result<(SessionId, String), Status> {
        let header = header.ok_or_else(|| Status::invalid_argument("missing header"))?;
        let record = self
            .sessions
            .get(&header.session_id)
            .ok_or_else(|| Status::not_found(format!("unknown session {}", header.session_id)))?;
        Ok((header.session_id, record.primitive.clone()))
    }

    fn close(&mut self, session_id: SessionId, delete: bool) {
        let Some(record) = self.sessions.remove(&session_id) else {
            return;
        };
        if delete {
            self.lists.remove(&record.primitive);
            self.counters.remove(&record.primitive);
            self.listeners
                .retain(|listener| listener.primitive != record.primitive);
        } else {
            self.listeners
                .retain(|listener| listener.session_id != session_id);
        }
    }

    /// Response header for `session_id`, reporting its listener positions.
    fn header(&self, session_id: SessionId) -> Option<Header> {
        let mut streams: Vec<StreamHeader> = self
            .listeners
            .iter()
            .filter(|listener| listener.session_id == session_id)
            .map(|listener| StreamHeader::new(listener.stream_id, listener.index))
            .collect();
        streams.sort_unstable_by_key(|stream| stream.stream_id);
        Some(Header {
            session_id,
            partition_id: 0,
            sequence_number: None,
            streams,
        })
    }

    fn publish(&mut self, primitive: &str, origin: SessionId, kind: EventType, value: &str) {
        self.listeners.retain_mut(|listener| {
            if listener.primitive != primitive {
                return true;
            }
            listener.index += 1;
            let streams = if listener.session_id == origin {
                vec![StreamHeader::new(listener.stream_id, listener.index)]
            } else {
                Vec::new()
            };
            let event = EventResponse {
                header: Some(Header {
                    session_id: listener.session_id,
                    partition_id: 0,
                    sequence_number: None,
                    streams,
                }),
                kind: kind as i32,
                value: value.to_string(),
            };
            listener.tx.send(Ok(event)).is_ok()
        });
    }

    fn items(&mut self, primitive: &str) -> &mut Vec<String> {
        self.lists.entry(primitive.to_string()).or_default()
    }
}

#[derive(Default)]
struct Stats {
    creates: AtomicUsize,
    keep_alives: AtomicUsize,
    closes: AtomicUsize,
    deletes: AtomicUsize,
    append_delay_ms: AtomicU64,
    fail_iterations: AtomicBool,
}

/// One partition of the in-memory backend.
#[derive(Clone, Default)]
pub struct Backend {
    state: Arc<Mutex<State>>,
    stats: Arc<Stats>,
}

impl Backend {
    pub fn creates(&self) -> usize {
        self.stats.creates.load(Ordering::SeqCst)
    }

    pub fn keep_alives(&self) -> usize {
        self.stats.keep_alives.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.stats.deletes.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .sessions
            .values()
            .map(|record| record.client_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn list_items(&self, primitive: &str) -> Option<Vec<String>> {
        self.state.lock().lists.get(primitive).cloned()
    }

    pub fn listeners(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Delays append responses after the resulting events have been sent.
    pub fn delay_appends(&self, delay: Duration) {
        self.stats
            .append_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fails every open listener with `status` and forgets it.
    pub fn fail_listeners(&self, status: Status) {
        let listeners = core::mem::take(&mut self.state.lock().listeners);
        for listener in listeners {
            let _ = listener.tx.send(Err(status.clone()));
        }
    }

    /// Ends every later `Iterate` stream with an error after its items.
    pub fn fail_iterations(&self, fail: bool) {
        self.stats.fail_iterations.store(fail, Ordering::SeqCst);
    }

    /// Serves this backend on an ephemeral local port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let incoming = TcpListenerStream::new(listener);

        let router = Server::builder()
            .add_service(ListServiceServer::new(self.clone()))
            .add_service(CounterServiceServer::new(self.clone()));
        tokio::spawn(router.serve_with_incoming(incoming));
        addr
    }
}

/// A running cluster: one backend and one connected channel per partition.
pub struct Cluster {
    pub backends: Vec<Backend>,
    pub channels: Vec<Channel>,
}

impl Cluster {
    pub async fn start(partitions: usize) -> Self {
        let mut backends = Vec::with_capacity(partitions);
        let mut channels = Vec::with_capacity(partitions);
        for _ in 0..partitions {
            let backend = Backend::default();
            let addr = backend.serve().await;
            let channel = Endpoint::from_shared(format!("http://{addr}"))
                .unwrap()
                .connect()
                .await
                .unwrap();
            backends.push(backend);
            channels.push(channel);
        }
        Self { backends, channels }
    }

    pub fn client(&self, config: ClientConfig) -> Client {
        Client::new(self.channels.clone(), config).unwrap()
    }

    /// The backend serving primitive `name`.
    pub fn backend_for(&self, name: &str) -> &Backend {
        let index = quorix_client::partition::partition_index(name, self.backends.len()).unwrap();
        &self.backends[index]
    }
}

fn out_of_range(index: u32, len: usize) -> Status {
    Status::out_of_range(format!("index {index} out of range for list of {len}"))
}

#[tonic::async_trait]
impl ListService for Backend {
    type EventsStream = UnboundedReceiverStream<Result<EventResponse, Status>>;
    type IterateStream = Pin<Box<dyn Stream<Item = Result<IterateResponse, Status>> + Send>>;

    async fn create(
        &self,
        req: Request<list::CreateRequest>,
    ) -> Result<Response<list::CreateResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let session_id = state.open(req.id, req.client_id)?;
        let (_, primitive) = state.session(Some(&Header {
            session_id,
            ..Header::empty(0)
        }))?;
        state.items(&primitive);
        self.stats.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(list::CreateResponse {
            header: state.header(session_id),
        }))
    }

    async fn keep_alive(
        &self,
        req: Request<list::KeepAliveRequest>,
    ) -> Result<Response<list::KeepAliveResponse>, Status> {
        let state = self.state.lock();
        let (session_id, _) = state.session(req.get_ref().header.as_ref())?;
        self.stats.keep_alives.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(list::KeepAliveResponse {
            header: state.header(session_id),
        }))
    }

    async fn close(
        &self,
        req: Request<list::CloseRequest>,
    ) -> Result<Response<list::CloseResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, _) = state.session(req.header.as_ref())?;
        state.close(session_id, req.delete);
        if req.delete {
            self.stats.deletes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Response::new(list::CloseResponse { header: None }))
    }

    async fn size(
        &self,
        req: Request<list::SizeRequest>,
    ) -> Result<Response<list::SizeResponse>, Status> {
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.get_ref().header.as_ref())?;
        let size = state.items(&primitive).len() as u32;
        Ok(Response::new(list::SizeResponse {
            header: state.header(session_id),
            size,
        }))
    }

    async fn get(
        &self,
        req: Request<list::GetRequest>,
    ) -> Result<Response<list::GetResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.header.as_ref())?;
        let items = state.items(&primitive);
        let value = items
            .get(req.index as usize)
            .cloned()
            .ok_or_else(|| out_of_range(req.index, items.len()))?;
        Ok(Response::new(list::GetResponse {
            header: state.header(session_id),
            value,
        }))
    }

    async fn append(
        &self,
        req: Request<list::AppendRequest>,
    ) -> Result<Response<list::AppendResponse>, Status> {
        let req = req.into_inner();
        let header = {
            let mut state = self.state.lock();
            let (session_id, primitive) = state.session(req.header.as_ref())?;
            state.items(&primitive).push(req.value.clone());
            state.publish(&primitive, session_id, EventType::Added, &req.value);
            state.header(session_id)
        };

        let delay = self.stats.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(Response::new(list::AppendResponse { header }))
    }

    async fn insert(
        &self,
        req: Request<list::InsertRequest>,
    ) -> Result<Response<list::InsertResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.header.as_ref())?;
        let items = state.items(&primitive);
        if req.index as usize > items.len() {
            return Err(out_of_range(req.index, items.len()));
        }
        items.insert(req.index as usize, req.value.clone());
        state.publish(&primitive, session_id, EventType::Added, &req.value);
        Ok(Response::new(list::InsertResponse {
            header: state.header(session_id),
        }))
    }

    async fn remove(
        &self,
        req: Request<list::RemoveRequest>,
    ) -> Result<Response<list::RemoveResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.header.as_ref())?;
        let items = state.items(&primitive);
        if req.index as usize >= items.len() {
            return Err(out_of_range(req.index, items.len()));
        }
        let value = items.remove(req.index as usize);
        state.publish(&primitive, session_id, EventType::Removed, &value);
        Ok(Response::new(list::RemoveResponse {
            header: state.header(session_id),
            value,
        }))
    }

    async fn clear(
        &self,
        req: Request<list::ClearRequest>,
    ) -> Result<Response<list::ClearResponse>, Status> {
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.get_ref().header.as_ref())?;
        let removed = core::mem::take(state.items(&primitive));
        for value in &removed {
            state.publish(&primitive, session_id, EventType::Removed, value);
        }
        Ok(Response::new(list::ClearResponse {
            header: state.header(session_id),
        }))
    }

    async fn events(
        &self,
        req: Request<list::EventRequest>,
    ) -> Result<Response<Self::EventsStream>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.header.as_ref())?;
        let stream_id = req
            .header
            .and_then(|header| header.sequence_number)
            .ok_or_else(|| {
                Status::invalid_argument("listen request carries no sequence number")
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if req.replay {
            for value in state.items(&primitive).iter() {
                let _ = tx.send(Ok(EventResponse {
                    header: None,
                    kind: EventType::Added as i32,
                    value: value.clone(),
                }));
            }
        }
        state.listeners.push(Listener {
            session_id,
            primitive,
            stream_id,
            index: 0,
            tx,
        });
        Ok(Response::new(UnboundedReceiverStream::new(rx)))
    }

    async fn iterate(
        &self,
        req: Request<list::IterateRequest>,
    ) -> Result<Response<Self::IterateStream>, Status> {
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.get_ref().header.as_ref())?;
        let header = state.header(session_id);
        let mut responses: Vec<Result<IterateResponse, Status>> = state
            .items(&primitive)
            .iter()
            .map(|value| {
                Ok(IterateResponse {
                    header: header.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        if self.stats.fail_iterations.load(Ordering::SeqCst) {
            responses.push(Err(Status::unavailable("partition lost")));
        }
        Ok(Response::new(Box::pin(tokio_stream::iter(responses))))
    }
}

#[tonic::async_trait]
impl CounterService for Backend {
    async fn create(
        &self,
        req: Request<counter::CreateRequest>,
    ) -> Result<Response<counter::CreateResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let key = req.id.as_ref().map(ToString::to_string);
        let session_id = state.open(req.id, req.client_id)?;
        if let Some(key) = key {
            state.counters.entry(key).or_insert(0);
        }
        self.stats.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(counter::CreateResponse {
            header: state.header(session_id),
        }))
    }

    async fn keep_alive(
        &self,
        req: Request<counter::KeepAliveRequest>,
    ) -> Result<Response<counter::KeepAliveResponse>, Status> {
        let state = self.state.lock();
        let (session_id, _) = state.session(req.get_ref().header.as_ref())?;
        self.stats.keep_alives.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(counter::KeepAliveResponse {
            header: state.header(session_id),
        }))
    }

    async fn close(
        &self,
        req: Request<counter::CloseRequest>,
    ) -> Result<Response<counter::CloseResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, _) = state.session(req.header.as_ref())?;
        state.close(session_id, req.delete);
        if req.delete {
            self.stats.deletes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Response::new(counter::CloseResponse { header: None }))
    }

    async fn get(
        &self,
        req: Request<counter::GetRequest>,
    ) -> Result<Response<counter::GetResponse>, Status> {
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.get_ref().header.as_ref())?;
        let value = *state.counters.entry(primitive).or_insert(0);
        Ok(Response::new(counter::GetResponse {
            header: state.header(session_id),
            value,
        }))
    }

    async fn set(
        &self,
        req: Request<counter::SetRequest>,
    ) -> Result<Response<counter::SetResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.header.as_ref())?;
        let previous_value = state.counters.insert(primitive, req.value).unwrap_or(0);
        Ok(Response::new(counter::SetResponse {
            header: state.header(session_id),
            previous_value,
        }))
    }

    async fn increment(
        &self,
        req: Request<counter::IncrementRequest>,
    ) -> Result<Response<counter::IncrementResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.header.as_ref())?;
        let value = state.counters.entry(primitive).or_insert(0);
        let previous_value = *value;
        *value += req.delta;
        let next_value = *value;
        Ok(Response::new(counter::IncrementResponse {
            header: state.header(session_id),
            previous_value,
            next_value,
        }))
    }

    async fn decrement(
        &self,
        req: Request<counter::DecrementRequest>,
    ) -> Result<Response<counter::DecrementResponse>, Status> {
        let req = req.into_inner();
        let mut state = self.state.lock();
        let (session_id, primitive) = state.session(req.header.as_ref())?;
        let value = state.counters.entry(primitive).or_insert(0);
        let previous_value = *value;
        *value -= req.delta;
        let next_value = *value;
        Ok(Response::new(counter::DecrementResponse {
            header: state.header(session_id),
            previous_value,
            next_value,
        }))
    }
}
