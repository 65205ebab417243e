//! Middleware executor.
//!
//! A middleware is an async function of `(args, next)` returning a response.
//! Returning without calling `next` short-circuits the chain; awaiting
//! `next.run(args)` allows post-processing of the downstream response. The
//! terminal step of every chain is the route handler. Ordering is global
//! middlewares first, then route middlewares, both in declaration order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::Result;
use crate::request::Request;
use crate::response::{Response, ResponseBuilder};

/// Future type produced by handlers and middlewares.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

/// Terminal route handler.
pub type Handler = Arc<dyn Fn(Arc<RequestArgs>) -> HandlerFuture + Send + Sync>;

/// One step of the chain. Receives the shared request args and the
/// continuation.
pub type Middleware = Arc<dyn Fn(Arc<RequestArgs>, Next) -> HandlerFuture + Send + Sync>;

/// Per-request state shared by every step of the chain.
///
/// `query` and `body` hold the parsed values; the pipeline validates them
/// against the route schemas before the chain starts, so a handler only ever
/// runs on data that passed its schemas. The context map is scratch space
/// for passing state between middlewares and the handler.
pub struct RequestArgs {
    pub request: Request,
    pub params: HashMap<String, String>,
    pub query: Value,
    pub body: Value,
    ctx: Mutex<HashMap<String, Value>>,
    res: ResponseBuilder,
}

impl RequestArgs {
    pub fn new(
        request: Request,
        params: HashMap<String, String>,
        query: Value,
        body: Value,
    ) -> Self {
        RequestArgs {
            request,
            params,
            query,
            body,
            ctx: Mutex::new(HashMap::new()),
            res: ResponseBuilder::new(),
        }
    }

    /// The response builder carried by this request.
    pub fn res(&self) -> &ResponseBuilder {
        &self.res
    }

    /// A path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Read a context entry (cloned).
    pub fn ctx_get(&self, key: &str) -> Option<Value> {
        self.ctx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Write a context entry.
    pub fn ctx_set(&self, key: impl Into<String>, value: Value) {
        self.ctx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }
}

/// Continuation into the rest of the chain. Consumed by `run`.
pub struct Next {
    chain: Arc<Vec<Middleware>>,
    index: usize,
    handler: Handler,
}

impl Next {
    pub(crate) fn new(chain: Arc<Vec<Middleware>>, handler: Handler) -> Self {
        Next {
            chain,
            index: 0,
            handler,
        }
    }

    /// Advance one step: the next middleware, or the handler at the end.
    pub fn run(self, args: Arc<RequestArgs>) -> HandlerFuture {
        match self.chain.get(self.index).cloned() {
            Some(step) => {
                let next = Next {
                    chain: self.chain,
                    index: self.index + 1,
                    handler: self.handler,
                };
                step(args, next)
            }
            None => (self.handler)(args),
        }
    }
}

/// Run a chain to completion. With an empty chain this is a plain handler
/// invocation.
pub fn run_chain(
    middlewares: Arc<Vec<Middleware>>,
    handler: Handler,
    args: Arc<RequestArgs>,
) -> HandlerFuture {
    Next::new(middlewares, handler).run(args)
}

/// Wrap an async closure as a [`Middleware`].
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Arc<RequestArgs>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |args, next| Box::pin(f(args, next)))
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<RequestArgs>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}
