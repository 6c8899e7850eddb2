//! Resource router: maps request paths onto registered models
//!
//! Every registered model gets four routes (`/<name>/pva`, `/<name>/geom`,
//! `/<name>/data`, `/<name>/cfg`) sharing one binding of its handle and
//! interface type. The simulation itself answers `/sim/tree` and
//! `/sim/clock`.

use avon_core::codec;
use avon_core::{
    ClockFn, DispatchError, DispatchTable, GenericCallbacks, InterfaceType, ModelId, Registry,
    RegistryError,
};
use axum::http::Method;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::RequestError;

/// Outcome of a request: a body to encode, an empty success, or an error
pub type Reply = Result<Option<Value>, RequestError>;

pub const TREE_PATH: &str = "/sim/tree";
pub const CLOCK_PATH: &str = "/sim/clock";

/// Per-model resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Pva,
    Geom,
    Data,
    Cfg,
}

impl Resource {
    pub const ALL: [Resource; 4] = [Self::Pva, Self::Geom, Self::Data, Self::Cfg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pva => "pva",
            Self::Geom => "geom",
            Self::Data => "data",
            Self::Cfg => "cfg",
        }
    }

    /// Path of this resource for a model
    pub fn path(&self, id: &ModelId) -> String {
        format!("/{}/{}", id, self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Tree,
    Clock,
    Model { resource: Resource, binding: usize },
}

struct Binding<H> {
    id: ModelId,
    interface: InterfaceType,
    handle: H,
}

/// Read-only state a request is answered from
pub struct Services<'a, H> {
    pub registry: &'a Registry,
    pub dispatch: &'a DispatchTable<H>,
    pub generic: &'a GenericCallbacks<H>,
    pub clock: &'a ClockFn,
}

pub struct Router<H> {
    routes: HashMap<String, Route>,
    bindings: Vec<Binding<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    /// Create a router with the simulation routes bound
    pub fn new() -> Self {
        let mut routes = HashMap::new();
        routes.insert(TREE_PATH.to_string(), Route::Tree);
        routes.insert(CLOCK_PATH.to_string(), Route::Clock);
        Self {
            routes,
            bindings: Vec::new(),
        }
    }

    /// Fail if any resource path of `id` is already bound
    pub fn ensure_unbound(&self, id: &ModelId) -> Result<(), RegistryError> {
        if Resource::ALL
            .iter()
            .any(|r| self.routes.contains_key(&r.path(id)))
        {
            return Err(RegistryError::DuplicateName(id.to_string()));
        }
        Ok(())
    }

    /// Bind all resources of a model. Existing routes are never replaced.
    pub fn bind_model(
        &mut self,
        id: &ModelId,
        interface: InterfaceType,
        handle: H,
    ) -> Result<(), RegistryError> {
        self.ensure_unbound(id)?;

        let binding = self.bindings.len();
        self.bindings.push(Binding {
            id: id.clone(),
            interface,
            handle,
        });
        for resource in Resource::ALL {
            self.routes
                .insert(resource.path(id), Route::Model { resource, binding });
        }
        Ok(())
    }

    pub fn is_bound(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    /// All bound paths, unordered
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(|p| p.as_str())
    }

    /// Answer a request
    pub fn handle(&self, services: &Services<'_, H>, method: &Method, path: &str, body: &[u8]) -> Reply {
        let route = self
            .routes
            .get(path)
            .ok_or_else(|| RequestError::NotFound(format!("no resource at {}", path)))?;

        match *route {
            Route::Tree => handle_tree(services, method),
            Route::Clock => handle_clock(services, method),
            Route::Model { resource, binding } => {
                let binding = &self.bindings[binding];
                match resource {
                    Resource::Pva => handle_pva(services, binding, method, body),
                    Resource::Geom => handle_geom(services, binding, method),
                    Resource::Data => handle_data(services, binding, method),
                    Resource::Cfg => handle_cfg(services, binding, method),
                }
            }
        }
    }
}

fn unrecognized(resource: &str, method: &Method) -> RequestError {
    RequestError::UnrecognizedMethod(format!("{} unrecognized action: {}", resource, method))
}

fn encoding_failed(err: impl std::fmt::Display) -> RequestError {
    RequestError::Encoding(err.to_string())
}

fn accessor_failed(resource: &str, id: &ModelId, err: impl std::fmt::Display) -> RequestError {
    RequestError::AccessorFailed(format!("{} of {} unavailable: {}", resource, id, err))
}

fn handle_tree<H>(services: &Services<'_, H>, method: &Method) -> Reply {
    match *method {
        Method::GET => {
            let view = services
                .registry
                .subtree_view(None)
                .map_err(encoding_failed)?;
            Ok(Some(codec::encode_tree(&view).map_err(encoding_failed)?))
        }
        Method::HEAD => Ok(None),
        Method::POST => Err(RequestError::ReadOnly("tree is read-only".to_string())),
        _ => Err(unrecognized("tree", method)),
    }
}

fn handle_clock<H>(services: &Services<'_, H>, method: &Method) -> Reply {
    match *method {
        Method::GET => Ok(Some(codec::encode_clock((services.clock)()))),
        Method::HEAD => Ok(None),
        Method::POST => Err(RequestError::NotImplemented(
            "clock POST not implemented".to_string(),
        )),
        _ => Err(unrecognized("clock", method)),
    }
}

fn handle_pva<H>(
    services: &Services<'_, H>,
    binding: &Binding<H>,
    method: &Method,
    body: &[u8],
) -> Reply {
    match *method {
        Method::GET => current_pva(services, binding),
        Method::HEAD => Ok(None),
        Method::POST => {
            let pva = codec::decode_pva(body)
                .map_err(|e| RequestError::Decode(format!("pva POST rejected: {}", e)))?;
            services
                .generic
                .set_pva(&binding.handle, &pva)
                .map_err(|e| accessor_failed("pva", &binding.id, e))?;
            current_pva(services, binding)
        }
        _ => Err(unrecognized("pva", method)),
    }
}

fn current_pva<H>(services: &Services<'_, H>, binding: &Binding<H>) -> Reply {
    let pva = services
        .generic
        .get_pva(&binding.handle)
        .map_err(|e| accessor_failed("pva", &binding.id, e))?;
    Ok(Some(codec::encode_pva(&pva).map_err(encoding_failed)?))
}

fn handle_geom<H>(services: &Services<'_, H>, binding: &Binding<H>, method: &Method) -> Reply {
    match *method {
        Method::GET => {
            let geom = services
                .generic
                .get_geom(&binding.handle)
                .map_err(|e| accessor_failed("geom", &binding.id, e))?;
            Ok(Some(codec::encode_geom(&geom).map_err(encoding_failed)?))
        }
        Method::HEAD => Ok(None),
        Method::POST => Err(RequestError::NotImplemented(
            "geom POST not implemented".to_string(),
        )),
        _ => Err(unrecognized("geom", method)),
    }
}

fn handle_data<H>(services: &Services<'_, H>, binding: &Binding<H>, method: &Method) -> Reply {
    match *method {
        Method::GET => services
            .dispatch
            .render_data(binding.interface, &binding.handle)
            .map(Some)
            .map_err(|e| dispatch_failed("data", binding, e)),
        Method::HEAD => Ok(None),
        Method::POST => Err(RequestError::ReadOnly("data is read-only".to_string())),
        _ => Err(unrecognized("data", method)),
    }
}

fn handle_cfg<H>(services: &Services<'_, H>, binding: &Binding<H>, method: &Method) -> Reply {
    match *method {
        Method::GET => services
            .dispatch
            .render_cfg(binding.interface, &binding.handle)
            .map(Some)
            .map_err(|e| dispatch_failed("cfg", binding, e)),
        Method::HEAD => Ok(None),
        Method::POST => Err(RequestError::ReadOnly("cfg is read-only".to_string())),
        _ => Err(unrecognized("cfg", method)),
    }
}

fn dispatch_failed<H>(resource: &str, binding: &Binding<H>, err: DispatchError) -> RequestError {
    match err {
        DispatchError::CapabilityAbsent { .. } => RequestError::CapabilityAbsent(format!(
            "{} GET not found: {}",
            resource, err
        )),
        DispatchError::Accessor(e) => accessor_failed(resource, &binding.id, e),
        DispatchError::Codec(e) => encoding_failed(e),
    }
}
