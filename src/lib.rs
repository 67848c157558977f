//! # querydp
//! Typechecker and compiler for differentially private declarative queries
//!
//! ## What is querydp?
//! An analyst describes a query as an ordered list of steps (`select`, `filter`, `rename`, `bin`,
//! then a `count` or a `sum` with a noise mechanism) over a tabular dataset, along with a privacy
//! budget and a privacy notion. The query is released with noise calibrated to that budget.
//!
//! ### One grammar, two passes
//! Step sequences are validated by a single four-state machine ([`grammar::Grammar`]).
//! The [`typechecker`] runs it on the schema alone, so illegal queries are rejected before any data
//! is fetched. The [`compiler`] runs the very same machine while assembling a pipeline: a
//! projection of the dataset and one measurement whose noise scale is the smallest meeting the
//! budget.
//!
//! ### Mechanisms
//! Laplace and Gaussian noise, discrete for counts and integer sums, continuous for real sums.
//! Calibration and accuracy bounds live in [`mechanisms`], behind the
//! [`mechanisms::MechanismLibrary`] trait.
//!
//! ```
//! use querydp::{
//!     query::{Budget, Mechanism, PrivacyNotion, Step},
//!     schema::{ColumnType, Schema},
//!     service, Ready, With,
//! };
//!
//! let schema = Schema::builder().with(("age", ColumnType::int(18, 90))).build();
//! let steps = [Step::bin("age", [18, 25]), Step::count("age", Mechanism::Laplace)];
//! let validation = service::validate(&steps, &schema, &Budget::new(1.), PrivacyNotion::PureDP);
//! assert!(validation.valid);
//! ```
//!

pub mod builder;
pub mod compiler;
pub mod dataset;
#[macro_use]
pub mod expr;
pub mod grammar;
pub mod mechanisms;
pub mod parameters;
pub mod query;
pub mod schema;
pub mod service;
pub mod setup;
pub mod typechecker;
pub mod value;

pub use builder::{Ready, With, WithIterator};
pub use compiler::{CompiledPipeline, Compiler, Evaluation, Release};
pub use expr::Expr;
pub use grammar::{Error, ErrorKind, Result};
pub use parameters::Parameters;
pub use query::{Budget, Mechanism, PrivacyNotion, Step};
pub use schema::{ColumnType, Schema};
pub use typechecker::Typechecker;
pub use value::Value;
