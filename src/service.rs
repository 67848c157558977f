//! # Service
//!
//! The caller-facing contract. Queries are typechecked before their dataset is fetched,
//! then compiled and evaluated against the payload served by a [`CachedProvider`].
//! Every failure comes back as an [`Error`] of the query taxonomy; a panic inside the mechanism
//! library is caught and reported as [`Error::Upstream`].
//!

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};

use crate::{
    compiler::{Compiler, Evaluation},
    dataset::{
        provider::{CachedProvider, DatasetId, DatasetProvider},
        Dataset,
    },
    grammar::{Error, Result},
    mechanisms::{Library, MechanismLibrary},
    parameters::Parameters,
    query::{AccuracyRequest, Budget, PrivacyNotion, QueryRequest, Step},
    schema::Schema,
    typechecker::Typechecker,
};

/// The answer to a validation request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub status: String,
}

impl Validation {
    pub fn valid() -> Self {
        Validation {
            valid: true,
            status: "query is valid".to_string(),
        }
    }

    pub fn invalid(err: &Error) -> Self {
        Validation {
            valid: false,
            status: err.message().to_string(),
        }
    }
}

impl From<Result<()>> for Validation {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Validation::valid(),
            Err(err) => Validation::invalid(&err),
        }
    }
}

/// Run `f`, turning a panic into an upstream error
fn recover<T, F: FnOnce() -> Result<T>>(operation: &str, f: F) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|reason| reason.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown failure".to_string());
        log::error!("{operation} failed unexpectedly: {reason}");
        Err(Error::upstream(format!("{operation} failed unexpectedly")))
    })
}

/// Validate a query without touching data
pub fn validate(
    steps: &[Step],
    schema: &Schema,
    budget: &Budget,
    notion: PrivacyNotion,
) -> Validation {
    Typechecker::new(schema.clone(), *budget, notion)
        .check(steps)
        .map(|_| ())
        .into()
}

fn compile<'a>(
    steps: &[Step],
    schema: &Schema,
    budget: &Budget,
    notion: PrivacyNotion,
    library: &'a dyn MechanismLibrary,
    parameters: &Parameters,
) -> Result<Compiler<'a>> {
    Typechecker::new(schema.clone(), *budget, notion)
        .with_parameters(parameters)
        .check(steps)?;
    Compiler::new(schema.clone(), *budget, notion, library)
        .with_parameters(parameters)
        .compile(steps)
}

/// Compile a query and run it on a CSV payload
pub fn compile_and_evaluate(
    steps: &[Step],
    schema: &Schema,
    budget: &Budget,
    notion: PrivacyNotion,
    data: &str,
) -> Result<Evaluation> {
    let library = Library::default();
    recover("evaluation", || {
        let compiler = compile(steps, schema, budget, notion, &library, library.parameters())?;
        compiler.evaluate(&Dataset::from_csv(data, schema)?)
    })
}

/// Compile a query on a CSV payload and return its accuracy at `confidence`
pub fn compile_and_accuracy(
    steps: &[Step],
    schema: &Schema,
    budget: &Budget,
    notion: PrivacyNotion,
    data: &str,
    confidence: f64,
) -> Result<f64> {
    let library = Library::default();
    recover("accuracy", || {
        Dataset::from_csv(data, schema)?;
        compile(steps, schema, budget, notion, &library, library.parameters())?.accuracy(confidence)
    })
}

/// Serves queries over the datasets of a provider
pub struct QueryService<P, L = Library> {
    provider: CachedProvider<P>,
    library: L,
    parameters: Parameters,
}

impl<P: DatasetProvider> QueryService<P> {
    pub fn new(provider: P, parameters: Parameters) -> Self {
        QueryService {
            provider: CachedProvider::new(provider),
            library: Library::new(parameters.clone()),
            parameters,
        }
    }
}

impl<P: DatasetProvider, L: MechanismLibrary> QueryService<P, L> {
    pub fn with_library(provider: P, library: L, parameters: Parameters) -> Self {
        QueryService {
            provider: CachedProvider::new(provider),
            library,
            parameters,
        }
    }

    pub fn provider(&self) -> &CachedProvider<P> {
        &self.provider
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn validate(&self, request: &QueryRequest) -> Validation {
        request
            .schema()
            .and_then(|schema| {
                Typechecker::new(schema, request.budget, request.privacy_notion)
                    .with_parameters(&self.parameters)
                    .check(&request.query)
                    .map(|_| ())
            })
            .into()
    }

    fn compile(&self, request: &QueryRequest) -> Result<(Compiler<'_>, Dataset)> {
        let schema = request.schema()?;
        let compiler = compile(
            &request.query,
            &schema,
            &request.budget,
            request.privacy_notion,
            &self.library,
            &self.parameters,
        )?;
        let payload = self.provider.get(request.dataset)?;
        let data = Dataset::from_csv(&payload, &schema)?;
        Ok((compiler, data))
    }

    pub fn evaluate(&self, request: &QueryRequest) -> Result<Evaluation> {
        recover("evaluation", || {
            let (compiler, data) = self.compile(request)?;
            compiler.evaluate(&data)
        })
    }

    pub fn accuracy(&self, request: &AccuracyRequest) -> Result<f64> {
        recover("accuracy", || {
            let (compiler, _) = self.compile(&request.query)?;
            compiler.accuracy(request.confidence)
        })
    }

    /// Drop a dataset from the cache
    pub fn evict(&self, dataset: DatasetId) -> bool {
        self.provider.evict(dataset)
    }
}
