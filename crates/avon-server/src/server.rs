//! Server context: setup phase, validation and the serving loop
//!
//! [`Avon`] collects callbacks and registered models. [`Avon::startup`]
//! consumes it, checks that the mandatory callbacks are present and starts
//! the transport, returning a [`RunningAvon`] that can only serve. Models
//! can therefore never be registered once requests are being answered.

use avon_core::{
    ClockFn, DispatchTable, Formatter, GenericCallbacks, Geom, InterfaceCallbacks,
    InterfaceType, ModelId, Pva, Registry, RegistryError,
};
use avon_core::AccessorError;
use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::router::{Reply, Router, Services};
use crate::transport::{self, Inbound, Transport};

/// An Avon server being set up
///
/// `H` is the backend's model handle type. Handles are stored and passed
/// back to the backend's callbacks, never inspected.
pub struct Avon<H> {
    config: ServerConfig,
    registry: Registry,
    router: Router<H>,
    dispatch: DispatchTable<H>,
    generic: Option<GenericCallbacks<H>>,
    clock: Option<ClockFn>,
}

impl<H> Avon<H> {
    pub fn init(config: ServerConfig) -> Self {
        debug!(
            address = %config.bind_address(),
            backend = %config.backend_name,
            "Initialized Avon"
        );
        Self {
            config,
            registry: Registry::new(),
            router: Router::new(),
            dispatch: DispatchTable::new(),
            generic: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Install the simulation clock, in microseconds
    pub fn install_clock_callback(&mut self, clock: impl Fn() -> u64 + 'static) {
        self.clock = Some(Box::new(clock));
    }

    /// Install the pva and geom accessors shared by all models
    pub fn install_generic_callbacks(
        &mut self,
        pva_get: impl Fn(&H) -> Result<Pva, AccessorError> + 'static,
        pva_set: impl Fn(&H, &Pva) -> Result<(), AccessorError> + 'static,
        geom_get: impl Fn(&H) -> Result<Geom, AccessorError> + 'static,
        geom_set: impl Fn(&H, &Geom) -> Result<(), AccessorError> + 'static,
    ) {
        self.generic = Some(GenericCallbacks::new(pva_get, pva_set, geom_get, geom_set));
    }

    /// Install the data/cmd/cfg accessors of an interface type
    pub fn install_interface_callbacks(
        &mut self,
        interface: InterfaceType,
        callbacks: InterfaceCallbacks<H>,
    ) {
        self.dispatch.install_callbacks(interface, callbacks);
    }

    /// Install the data and cfg formatters of an interface type
    pub fn install_formatters(
        &mut self,
        interface: InterfaceType,
        data_formatter: Option<Formatter>,
        cfg_formatter: Option<Formatter>,
    ) {
        self.dispatch
            .install_formatters(interface, data_formatter, cfg_formatter);
    }

    /// Register a model and bind its resources.
    ///
    /// On error neither the registry nor the routes are changed.
    pub fn register_model(
        &mut self,
        name: &str,
        prototype: &str,
        interface: InterfaceType,
        parent: Option<&str>,
        handle: H,
    ) -> Result<(), RegistryError> {
        let id = ModelId::new(name)?;
        self.router.ensure_unbound(&id)?;
        self.registry.insert(&id, prototype, interface, parent)?;
        self.router.bind_model(&id, interface, handle)?;

        if self.config.verbose {
            info!(model = %id, parent = parent.unwrap_or("sim"), interface = %interface, "Registered model");
        } else {
            debug!(model = %id, parent = parent.unwrap_or("sim"), interface = %interface, "Registered model");
        }
        Ok(())
    }

    /// Validate the setup without starting a transport
    pub fn into_service(self) -> Result<Service<H>, ConfigError> {
        let clock = self.clock.ok_or(ConfigError::MissingClock)?;
        let generic = self.generic.ok_or(ConfigError::MissingGenericCallbacks)?;
        let server_header = server_header(&self.config)?;

        Ok(Service {
            config: self.config,
            registry: self.registry,
            router: self.router,
            dispatch: self.dispatch,
            generic,
            clock,
            server_header,
        })
    }

    /// Validate the setup and begin serving
    pub fn startup(self) -> Result<RunningAvon<H>, ConfigError> {
        let service = self.into_service()?;
        let config = &service.config;

        let root_dir = config
            .root_dir
            .canonicalize()
            .map_err(|_| ConfigError::InvalidRootDir(config.root_dir.clone()))?;
        if !root_dir.is_dir() {
            return Err(ConfigError::InvalidRootDir(config.root_dir.clone()));
        }

        let (tx, requests) = mpsc::channel(config.queue_depth.max(1));
        let app = transport::build_router(tx, service.server_header.clone(), &root_dir);
        let transport = Transport::start(&config.bind_address(), app)?;

        if config.verbose {
            info!(
                "Avon {} hosting {} {} at http://{} root {}",
                env!("CARGO_PKG_VERSION"),
                config.backend_name,
                config.backend_version,
                transport.local_addr(),
                root_dir.display()
            );
        }

        Ok(RunningAvon {
            service,
            transport,
            requests,
        })
    }
}

fn server_header(config: &ServerConfig) -> Result<HeaderValue, ConfigError> {
    let value = format!(
        "Avon/{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        config.backend_name,
        config.backend_version
    );
    HeaderValue::from_str(&value).map_err(|_| ConfigError::InvalidBackendName(value))
}

/// Validated, immutable server state that answers requests
pub struct Service<H> {
    config: ServerConfig,
    registry: Registry,
    router: Router<H>,
    dispatch: DispatchTable<H>,
    generic: GenericCallbacks<H>,
    clock: ClockFn,
    server_header: HeaderValue,
}

impl<H> Service<H> {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn router(&self) -> &Router<H> {
        &self.router
    }

    /// Value of the `server` response header
    pub fn server_header(&self) -> &HeaderValue {
        &self.server_header
    }

    /// Answer one request
    pub fn handle(&self, method: &Method, path: &str, body: &[u8]) -> Reply {
        let services = Services {
            registry: &self.registry,
            dispatch: &self.dispatch,
            generic: &self.generic,
            clock: &self.clock,
        };
        let reply = self.router.handle(&services, method, path, body);

        match &reply {
            Ok(_) if self.config.verbose => info!(%method, path, "Reply OK"),
            Ok(_) => debug!(%method, path, "Reply OK"),
            Err(e) => warn!(%method, path, status = e.status().as_u16(), error = %e, "Reply error"),
        }
        reply
    }

    /// Answer a forwarded request
    pub fn serve(&self, inbound: Inbound) {
        let reply = self.handle(&inbound.method, &inbound.path, &inbound.body);
        inbound.respond(reply);
    }
}

/// A server that is accepting requests
pub struct RunningAvon<H> {
    service: Service<H>,
    transport: Transport,
    requests: mpsc::Receiver<Inbound>,
}

impl<H> RunningAvon<H> {
    pub fn service(&self) -> &Service<H> {
        &self.service
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Handle requests, blocking until at least one has been answered.
    ///
    /// Returns the number of requests answered, 0 once the transport has
    /// gone away. Must not be called from within an async runtime.
    pub fn wait(&mut self) -> usize {
        match self.requests.blocking_recv() {
            Some(inbound) => {
                self.service.serve(inbound);
                1 + self.check()
            }
            None => 0,
        }
    }

    /// Handle the requests already pending, without blocking
    pub fn check(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(inbound) = self.requests.try_recv() {
            self.service.serve(inbound);
            handled += 1;
        }
        handled
    }

    /// Stop serving; requests still queued are refused
    pub fn teardown(self) {
        let RunningAvon {
            transport,
            requests,
            ..
        } = self;
        // Dropping the queue releases connections still waiting for a reply,
        // which the transport's graceful shutdown waits on.
        drop(requests);
        transport.stop();
        info!("Avon shut down");
    }
}
