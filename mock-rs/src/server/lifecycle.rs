//! Mock server lifecycle
//!
//! Unstarted -> Loaded -> Serving -> Stopped. The server owns the listener and
//! an [`ActiveRouter`]; every request is forwarded to whatever router is
//! installed at the time it arrives, so a reload only affects new requests.
//! Reload and Stop arrive as [`ServerEvent`]s on one channel and are handled
//! by a dispatch loop running beside the accept loop.

use crate::config::ServerConfig;
use crate::contract::{select_parser, Contract};
use crate::errors::{MockError, Result};
use crate::mock::{build_router, MockEngine};
use axum::extract::Request;
use axum::Router;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

/// Administrative event delivered to a running server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// Re-parse the examples directory and swap the router
    Reload,
    /// Close the listener and return from `serve`
    Stop,
}

/// Lifecycle state, ordered by progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Unstarted,
    Loaded,
    Serving,
    Stopped,
}

/// Cloneable control surface of a [`MockServer`]
#[derive(Debug, Clone)]
pub struct ServerHandle {
    events: mpsc::UnboundedSender<ServerEvent>,
    state: watch::Receiver<ServerState>,
}

impl ServerHandle {
    pub fn reload(&self) -> Result<()> {
        self.send(ServerEvent::Reload)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(ServerEvent::Stop)
    }

    pub fn send(&self, event: ServerEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| MockError::Server(format!("Cannot deliver {:?}, server is not running", event)))
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Wait until the server reaches `target` (or any later state)
    ///
    /// Returns the state actually observed, so waiting for `Serving` on a
    /// server whose initial load failed yields `Stopped`.
    pub async fn wait_for(&self, target: ServerState) -> Result<ServerState> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s >= target)
            .await
            .map_err(|_| MockError::Server("Server was dropped before starting".to_string()))?;
        Ok(*reached)
    }
}

/// Router reference swapped on every successful (re)load
#[derive(Debug)]
struct ActiveRouter {
    router: RwLock<Router>,
}

impl ActiveRouter {
    fn current(&self) -> Router {
        self.router
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap(&self, router: Router) {
        *self.router.write().unwrap_or_else(PoisonError::into_inner) = router;
    }
}

/// Builds a fresh engine and router from the examples directory
#[derive(Clone)]
struct Loader {
    dir: PathBuf,
    max_upload_bytes: usize,
    handle: ServerHandle,
    active: Arc<ActiveRouter>,
    /// Held for the whole parse-and-swap of every load
    lock: Arc<Mutex<()>>,
}

impl Loader {
    fn build(&self) -> Result<Router> {
        let parser = select_parser(&self.dir)?;
        let contract = Contract::from_data(parser.parse()?)?;
        info!(
            parser = parser.kind(),
            resources = contract.resources().len(),
            "Parsed examples in {}",
            self.dir.display()
        );

        let engine = MockEngine::new(contract, &self.dir).with_reload_handle(self.handle.clone());
        Ok(build_router(Arc::new(engine), self.max_upload_bytes))
    }

    /// Serialized against every other load of this server
    async fn load(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.install().await
    }

    /// Caller holds `lock`
    async fn install(&self) -> Result<()> {
        let loader = self.clone();
        let router = tokio::task::spawn_blocking(move || loader.build())
            .await
            .map_err(|e| MockError::Server(format!("Load task failed: {}", e)))??;

        self.active.swap(router);
        debug!("Installed new router");
        Ok(())
    }
}

/// HTTP mock serving the examples of one directory
pub struct MockServer {
    config: ServerConfig,
    listener: TcpListener,
    handle: ServerHandle,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    state: watch::Sender<ServerState>,
    active: Arc<ActiveRouter>,
    errors_tx: mpsc::UnboundedSender<MockError>,
    errors_rx: Option<mpsc::UnboundedReceiver<MockError>>,
}

impl MockServer {
    /// Bind the listener; nothing is served until [`MockServer::serve`]
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind)
            .await
            .map_err(|e| MockError::Server(format!("Failed to bind {}: {}", config.bind, e)))?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(ServerState::Unstarted);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            listener,
            handle: ServerHandle {
                events: events_tx,
                state: state_rx,
            },
            events,
            state,
            active: Arc::new(ActiveRouter {
                router: RwLock::new(Router::new()),
            }),
            errors_tx,
            errors_rx: Some(errors_rx),
        })
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Stream of reload failures; can be taken once
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<MockError>> {
        self.errors_rx.take()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Load the examples and serve until a Stop event arrives
    ///
    /// # Errors
    ///
    /// Fails without serving if the initial load fails, for example when the
    /// examples directory does not exist.
    pub async fn serve(self) -> Result<()> {
        let addr = self.local_addr()?;
        let dir = self.config.examples_dir.clone();
        let drain = self.config.drain_timeout();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut drain_rx = shutdown_rx.clone();

        let loader = Loader {
            dir: dir.clone(),
            max_upload_bytes: self.config.max_upload_bytes,
            handle: self.handle.clone(),
            active: Arc::clone(&self.active),
            lock: Arc::new(Mutex::new(())),
        };

        // Reloads queued before serve run after the initial load
        let initial = Arc::clone(&loader.lock).lock_owned().await;
        let dispatcher = tokio::spawn(dispatch_events(
            self.events,
            loader.clone(),
            shutdown_tx,
            self.errors_tx.clone(),
        ));

        let loaded = loader.install().await;
        drop(initial);
        if let Err(err) = loaded {
            error!("Initial load of {} failed: {}", dir.display(), err);
            dispatcher.abort();
            let _ = dispatcher.await;
            self.state.send_replace(ServerState::Stopped);
            return Err(err);
        }
        self.state.send_replace(ServerState::Loaded);

        let app = forwarding_router(Arc::clone(&self.active));
        self.state.send_replace(ServerState::Serving);
        info!("Serving {} on {}", dir.display(), addr);

        let server = axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .into_future();
        tokio::pin!(server);

        let result = tokio::select! {
            result = &mut server => result,
            _ = async {
                let _ = drain_rx.wait_for(|stop| *stop).await;
                tokio::time::sleep(drain).await;
            } => {
                warn!("Connections still open {:?} after stop, closing anyway", drain);
                Ok(())
            }
        };

        dispatcher.abort();
        let _ = dispatcher.await;
        self.state.send_replace(ServerState::Stopped);
        info!("Stopped serving on {}", addr);

        result.map_err(|e| MockError::Server(format!("Accept loop failed on {}: {}", addr, e)))
    }
}

/// Forward every request to the router installed at arrival time
fn forwarding_router(active: Arc<ActiveRouter>) -> Router {
    Router::new().fallback(move |request: Request| {
        let router = active.current();
        async move {
            match router.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        }
    })
}

async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    loader: Loader,
    shutdown: watch::Sender<bool>,
    errors: mpsc::UnboundedSender<MockError>,
) {
    // Reload tasks queue on the loader lock; Stop never waits on them
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::Reload => {
                let loader = loader.clone();
                let errors = errors.clone();
                tokio::spawn(async move {
                    info!("Reloading examples from {}", loader.dir.display());
                    match loader.load().await {
                        Ok(()) => info!("Reload complete"),
                        Err(err) => {
                            warn!("Reload failed, keeping previous contract: {}", err);
                            let _ = errors.send(err);
                        }
                    }
                });
            }
            ServerEvent::Stop => {
                info!("Stop requested");
                shutdown.send_replace(true);
            }
        }
    }
}
