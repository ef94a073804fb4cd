//! Scripted in-memory transport for HTTP retrier tests.

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use persevere::http::{BoxBody, ResponseBody, Transport, TransportError};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Observable lifecycle of one response body.
#[derive(Debug, Default)]
pub struct BodyState {
    drained: AtomicBool,
    closed: AtomicBool,
}

impl BodyState {
    pub fn drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct ScriptedBody {
    chunks: VecDeque<Bytes>,
    state: Arc<BodyState>,
}

#[async_trait]
impl ResponseBody for ScriptedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        let next = self.chunks.pop_front();
        if next.is_none() {
            self.state.drained.store(true, Ordering::SeqCst);
        }
        Ok(next)
    }

    fn close(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for ScriptedBody {
    fn drop(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// One scripted round trip.
pub enum Step {
    Respond { status: u16, headers: Vec<(&'static str, String)>, body: Vec<&'static str> },
    /// Single binary chunk, for encoded payloads.
    Raw { status: u16, headers: Vec<(&'static str, String)>, body: Bytes },
    Fail(io::ErrorKind),
}

impl Step {
    pub fn json(status: u16, body: &'static str) -> Self {
        Step::Respond {
            status,
            headers: vec![("content-type", "application/json".to_string())],
            body: vec![body],
        }
    }

    pub fn status(status: u16) -> Self {
        Step::Respond { status, headers: vec![], body: vec!["error body"] }
    }
}

/// Transport replaying a fixed script; records requests and body lifecycles.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    steps: Arc<Mutex<VecDeque<Step>>>,
    requests: Arc<Mutex<Vec<Request<Bytes>>>>,
    bodies: Arc<Mutex<Vec<Arc<BodyState>>>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps: Arc::new(Mutex::new(steps.into())), ..Default::default() }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Arc<BodyState>> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<BoxBody>, TransportError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front().expect("script exhausted");
        let (status, headers, chunks): (_, _, VecDeque<Bytes>) = match step {
            Step::Fail(kind) => return Err(TransportError::new(io::Error::from(kind))),
            Step::Respond { status, headers, body } => {
                let chunks = body.into_iter().map(|s| Bytes::from_static(s.as_bytes()));
                (status, headers, chunks.collect())
            }
            Step::Raw { status, headers, body } => (status, headers, VecDeque::from([body])),
        };
        let state = Arc::new(BodyState::default());
        self.bodies.lock().unwrap().push(state.clone());
        let body = ScriptedBody { chunks, state };
        let mut builder = Response::builder().status(StatusCode::from_u16(status).unwrap());
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        Ok(builder.body(Box::new(body) as BoxBody).unwrap())
    }
}

pub fn get(uri: &str) -> Result<Request<Bytes>, persevere::http::HttpError> {
    Ok(Request::get(uri).body(Bytes::new())?)
}
