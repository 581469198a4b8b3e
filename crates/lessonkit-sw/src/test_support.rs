//! Scripted fetcher used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use lessonkit_net::{Fetcher, NetError, Request, Response};

#[derive(Clone)]
enum Script {
    Respond(StatusCode, Bytes),
    Fail,
    Hang,
}

/// A fetcher answering from a per-URL script. Unknown URLs fail.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    total: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, status: StatusCode, body: &'static str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Script::Respond(status, Bytes::from_static(body.as_bytes())));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.scripts.lock().unwrap().insert(url.to_string(), Script::Fail);
    }

    pub(crate) fn hang(&self, url: &str) {
        self.scripts.lock().unwrap().insert(url.to_string(), Script::Hang);
    }

    pub(crate) fn calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let url = request.url.to_string();
        self.total.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(url.clone());

        let script = self.scripts.lock().unwrap().get(&url).cloned();
        match script {
            Some(Script::Respond(status, body)) => {
                Ok(Response::new(request.url.clone(), status, body))
            }
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Fail) | None => Err(NetError::RequestFailed(format!("offline: {}", url))),
        }
    }
}
