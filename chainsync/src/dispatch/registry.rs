use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use chainsync_postgres::types::TableSpec;

use crate::bail;
use crate::dispatch::Handler;
use crate::error::{ErrorKind, SyncResult};
use crate::types::{Input, InputKind, InputTarget};

/// A named domain and the table its handlers write to.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub name: String,
    pub table: TableSpec,
}

/// A handler bound to its domain and to the kind of input it accepts.
#[derive(Clone)]
pub struct RegisteredHandler {
    pub domain: Arc<Domain>,
    pub kind: InputKind,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("domain", &self.domain.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Handlers by input name, in registration order.
///
/// Built once at startup through [`HandlerRegistry::builder`] and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    domains: Vec<Arc<Domain>>,
    handlers: HashMap<String, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Returns the registered domains, in registration order.
    pub fn domains(&self) -> &[Arc<Domain>] {
        &self.domains
    }

    /// Returns the handlers accepting `input`, matching both its name and its kind.
    pub fn handlers_for<'a>(
        &'a self,
        input: &'a Input,
    ) -> impl Iterator<Item = &'a RegisteredHandler> + 'a {
        let kind = input.kind();
        self.handlers
            .get(input.name())
            .into_iter()
            .flatten()
            .filter(move |handler| handler.kind == kind)
    }

    /// Returns every input name and kind at least one handler listens to, sorted.
    pub fn targets(&self) -> Vec<InputTarget> {
        self.handlers
            .iter()
            .flat_map(|(name, handlers)| {
                handlers
                    .iter()
                    .map(move |handler| InputTarget::new(name.clone(), handler.kind))
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

struct PendingHandler {
    domain: String,
    input_name: String,
    kind: InputKind,
    handler: Arc<dyn Handler>,
}

/// Collects domains and handlers and checks them when building the registry.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    domains: Vec<Domain>,
    handlers: Vec<PendingHandler>,
}

impl HandlerRegistryBuilder {
    /// Declares a domain and its table.
    pub fn domain(mut self, name: impl Into<String>, table: TableSpec) -> Self {
        self.domains.push(Domain {
            name: name.into(),
            table,
        });
        self
    }

    /// Registers `handler` for the events named `input_name` on behalf of `domain`.
    pub fn on_event<H>(
        self,
        domain: impl Into<String>,
        input_name: impl Into<String>,
        handler: H,
    ) -> Self
    where
        H: Handler + 'static,
    {
        self.on(domain, input_name, InputKind::Event, handler)
    }

    /// Registers `handler` for the calls named `input_name` on behalf of `domain`.
    pub fn on_call<H>(
        self,
        domain: impl Into<String>,
        input_name: impl Into<String>,
        handler: H,
    ) -> Self
    where
        H: Handler + 'static,
    {
        self.on(domain, input_name, InputKind::Call, handler)
    }

    fn on<H>(
        mut self,
        domain: impl Into<String>,
        input_name: impl Into<String>,
        kind: InputKind,
        handler: H,
    ) -> Self
    where
        H: Handler + 'static,
    {
        self.handlers.push(PendingHandler {
            domain: domain.into(),
            input_name: input_name.into(),
            kind,
            handler: Arc::new(handler),
        });
        self
    }

    /// Builds the registry.
    ///
    /// Fails when a domain is declared twice, when a table spec is invalid or when a handler
    /// names an undeclared domain.
    pub fn build(self) -> SyncResult<HandlerRegistry> {
        let mut domains: Vec<Arc<Domain>> = Vec::with_capacity(self.domains.len());
        for domain in self.domains {
            if domains.iter().any(|existing| existing.name == domain.name) {
                bail!(
                    ErrorKind::InvalidInput,
                    "Domain declared more than once",
                    format!("domain `{}`", domain.name)
                );
            }

            domain.table.validate()?;
            domains.push(Arc::new(domain));
        }

        let mut handlers: HashMap<String, Vec<RegisteredHandler>> = HashMap::new();
        for pending in self.handlers {
            let Some(domain) = domains.iter().find(|domain| domain.name == pending.domain) else {
                bail!(
                    ErrorKind::InvalidInput,
                    "Handler registered for an unknown domain",
                    format!(
                        "{} `{}` -> domain `{}`",
                        pending.kind, pending.input_name, pending.domain
                    )
                );
            };

            handlers
                .entry(pending.input_name)
                .or_default()
                .push(RegisteredHandler {
                    domain: domain.clone(),
                    kind: pending.kind,
                    handler: pending.handler,
                });
        }

        Ok(HandlerRegistry { domains, handlers })
    }
}
