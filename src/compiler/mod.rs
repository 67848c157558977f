//! # Compiler
//!
//! Runs the [`Grammar`] with a [`PipelineBuilder`] pass: accepted steps are recorded as deferred
//! frame operations, the measure picks a [`Transformation`] and the implicit noise step calibrates
//! its scale against the budget through a [`MechanismLibrary`].
//! The result is a [`CompiledPipeline`], evaluated with [`Compiler::evaluate`].
//!
//! No data is needed to compile: the scale only depends on the mechanism, the budget and the
//! sensitivity of the aggregation.
//!

pub mod evaluator;
pub mod pipeline;

use itertools::Itertools;

use crate::{
    builder::Ready,
    dataset::Dataset,
    expr::Expr,
    grammar::{Bin, Error, Grammar, Pass, Result, State},
    mechanisms::{self, Measurement, MechanismLibrary, PrivacyLoss, Transformation},
    parameters::Parameters,
    query::{Budget, Mechanism, PrivacyNotion, Step},
    schema::{ColumnType, Schema},
    value::Value,
};

pub use evaluator::{Evaluation, Release};
pub use pipeline::{CompiledPipeline, FrameOp};

/// The aggregation chosen by a count or a sum, waiting for its noise
#[derive(Clone, Debug)]
struct PendingMeasure {
    transformation: Transformation,
    discrete: bool,
    label: String,
    categories: Option<Vec<Value>>,
}

/// The pass assembling a [`CompiledPipeline`]
pub struct PipelineBuilder<'a> {
    library: &'a dyn MechanismLibrary,
    parameters: Parameters,
    projection: Vec<FrameOp>,
    measure: Option<PendingMeasure>,
    pipeline: Option<CompiledPipeline>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(library: &'a dyn MechanismLibrary, parameters: Parameters) -> Self {
        PipelineBuilder {
            library,
            parameters,
            projection: vec![],
            measure: None,
            pipeline: None,
        }
    }

    pub fn pipeline(&self) -> Option<&CompiledPipeline> {
        self.pipeline.as_ref()
    }

    /// The histogram categories of a binned column
    fn categories(bin: &Bin, column_type: &ColumnType) -> Result<Vec<Value>> {
        match column_type {
            ColumnType::Int { .. } => {
                let bounds = bin.bins().iter().filter_map(Value::as_i64);
                match bounds.minmax().into_option() {
                    Some((low, high)) => Ok((low..=high).map(Value::from).collect()),
                    None => Err(Error::type_error(format!("{bin} has no integer bounds"))),
                }
            }
            ColumnType::Bool | ColumnType::Text | ColumnType::Enum { .. } => Ok(bin.bins().to_vec()),
            ColumnType::Double { .. } => Err(Error::unsupported(format!(
                "histograms of the Double column {} are not supported",
                bin.column()
            ))),
        }
    }
}

impl<'a> Pass for PipelineBuilder<'a> {
    fn select(&mut self, columns: &[String]) -> Result<()> {
        self.projection.push(FrameOp::Select(columns.to_vec()));
        Ok(())
    }

    fn filter(&mut self, predicate: &Expr) -> Result<()> {
        self.projection.push(FrameOp::Filter(predicate.clone()));
        Ok(())
    }

    fn rename(&mut self, old: &str, new: &str, state: &State) -> Result<()> {
        match (state, self.pipeline.as_mut()) {
            (State::NoiseAdded, Some(pipeline)) => pipeline.relabel(old, new),
            (State::NoiseAdded, None) => return Err(Error::syntax("noise not added")),
            _ => self
                .projection
                .push(FrameOp::Rename(old.to_string(), new.to_string())),
        }
        Ok(())
    }

    fn count(
        &mut self,
        column: &str,
        column_type: &ColumnType,
        bin: Option<&Bin>,
        _mechanism: Mechanism,
    ) -> Result<()> {
        let (transformation, categories) = match bin {
            Some(bin) => {
                let categories = PipelineBuilder::categories(bin, column_type)?;
                (
                    Transformation::count_by_categories(column, categories.clone()),
                    Some(categories),
                )
            }
            None => (Transformation::count(column), None),
        };
        self.measure = Some(PendingMeasure {
            transformation,
            discrete: true,
            label: column.to_string(),
            categories,
        });
        Ok(())
    }

    fn sum(&mut self, column: &str, column_type: &ColumnType, _mechanism: Mechanism) -> Result<()> {
        let (transformation, discrete) = match column_type {
            ColumnType::Int { low, high } => (Transformation::integer_sum(column, *low, *high), true),
            ColumnType::Double { low, high } => {
                (Transformation::float_sum(column, *low, *high), false)
            }
            column_type => {
                return Err(Error::type_error(format!(
                    "column {column} is of type {}, sum requires Int or Double",
                    column_type.name()
                )))
            }
        };
        self.measure = Some(PendingMeasure {
            transformation,
            discrete,
            label: column.to_string(),
            categories: None,
        });
        Ok(())
    }

    fn noise(&mut self, budget: &Budget, notion: PrivacyNotion, mechanism: Mechanism) -> Result<()> {
        let measure = self
            .measure
            .clone()
            .ok_or_else(|| Error::syntax("noise cannot be added before a count or a sum"))?;
        let (epsilon, delta) = (budget.epsilon(), budget.delta());
        let fix_delta = notion == PrivacyNotion::ApproxDP && delta > 0.;
        let library = self.library;
        let make_chain = |scale: f64| -> mechanisms::Result<Measurement> {
            let measurement = library.add_noise(
                measure.transformation.clone(),
                mechanism,
                measure.discrete,
                scale,
            )?;
            if fix_delta {
                measurement.fix_delta(delta)
            } else {
                Ok(measurement)
            }
        };
        let target = match notion {
            PrivacyNotion::PureDP => PrivacyLoss::Pure(epsilon),
            PrivacyNotion::ApproxDP => PrivacyLoss::Approximate(epsilon, delta),
        };
        let scale = library.calibrate_scale(&make_chain, 1., &target)?;
        if mechanism == Mechanism::Gaussian && epsilon > 1. {
            log::warn!("{mechanism} noise calibrated at ε = {epsilon} > 1, the classical analytic bound does not hold");
        }
        log::info!(
            "{} calibrated to scale {scale} for {target}",
            measure.transformation
        );
        let measurement = make_chain(scale)?;
        self.pipeline = Some(CompiledPipeline::new(
            self.projection.clone(),
            measurement,
            measure.label,
            measure.categories,
            self.parameters.seed(),
        ));
        Ok(())
    }
}

/// The compiler, a grammar driving a [`PipelineBuilder`]
pub struct Compiler<'a> {
    grammar: Grammar<PipelineBuilder<'a>>,
}

impl<'a> Compiler<'a> {
    pub fn new(
        schema: Schema,
        budget: Budget,
        notion: PrivacyNotion,
        library: &'a dyn MechanismLibrary,
    ) -> Self {
        Compiler {
            grammar: Grammar::new(
                schema,
                budget,
                notion,
                PipelineBuilder::new(library, Parameters::default()),
            ),
        }
    }

    pub fn with_parameters(mut self, parameters: &Parameters) -> Self {
        self.grammar.pass_mut().parameters = parameters.clone();
        Compiler {
            grammar: self.grammar.with_parameters(parameters),
        }
    }

    pub fn schema(&self) -> &Schema {
        self.grammar.schema()
    }

    pub fn state(&self) -> &State {
        self.grammar.state()
    }

    pub fn step(mut self, step: &Step) -> Result<Self> {
        self.grammar.step(step)?;
        Ok(self)
    }

    /// Compile a whole query
    pub fn compile<'b, I: IntoIterator<Item = &'b Step>>(self, steps: I) -> Result<Self> {
        Ok(Compiler {
            grammar: self.grammar.run(steps)?,
        })
    }

    pub fn pipeline(&self) -> Result<&CompiledPipeline> {
        match self.grammar.state() {
            State::NoiseAdded => self
                .grammar
                .pass()
                .pipeline()
                .ok_or_else(|| Error::syntax("noise not added")),
            _ => Err(Error::syntax("noise not added")),
        }
    }

    /// Run the pipeline on a dataset
    pub fn evaluate(&self, data: &Dataset) -> Result<Evaluation> {
        evaluator::evaluate(self.pipeline()?, data)
    }

    /// The accuracy of the release at a confidence level
    pub fn accuracy(&self, confidence: f64) -> Result<f64> {
        evaluator::accuracy(self.pipeline()?, self.grammar.pass().library, confidence)
    }
}

impl<'a> Ready<CompiledPipeline> for Compiler<'a> {
    type Error = Error;

    fn try_build(self) -> Result<CompiledPipeline> {
        self.grammar
            .finish()?
            .pipeline
            .ok_or_else(|| Error::syntax("noise not added"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::With, grammar::ErrorKind, mechanisms::Library};
    use Mechanism::{Gaussian, Laplace};

    fn schema() -> Schema {
        Schema::builder()
            .with(("age", ColumnType::int(18, 90)))
            .with(("job", ColumnType::text()))
            .with(("income", ColumnType::double(0., 150_000.)))
            .with(("married", ColumnType::boolean()))
            .build()
    }

    #[test]
    fn test_count() {
        let library = Library::default();
        let compiler = Compiler::new(schema(), Budget::new(0.1), PrivacyNotion::PureDP, &library)
            .compile(&[Step::count("age", Laplace)])
            .unwrap();
        let pipeline = compiler.pipeline().unwrap();
        println!("{pipeline}");
        assert!((pipeline.scale() - 10.).abs() < 1e-6);
        assert!(pipeline.discrete());
        assert_eq!(pipeline.mechanism(), Laplace);
        assert_eq!(pipeline.label(), "age");
        assert!(pipeline.categories().is_none());
    }

    #[test]
    fn test_histogram_categories() {
        let library = Library::default();
        let pipeline = Compiler::new(schema(), Budget::new(0.1), PrivacyNotion::PureDP, &library)
            .compile(&[Step::bin("age", [10, 45]), Step::count("age", Laplace)])
            .unwrap()
            .try_build()
            .unwrap();
        let categories = pipeline.categories().unwrap();
        assert_eq!(categories.len(), 36);
        assert_eq!(categories[0], Value::from(10));
        assert_eq!(categories[35], Value::from(45));
        let pipeline = Compiler::new(schema(), Budget::new(0.1), PrivacyNotion::PureDP, &library)
            .compile(&[
                Step::bin("married", [true, false]),
                Step::count("married", Laplace),
            ])
            .unwrap()
            .build();
        assert_eq!(
            pipeline.categories().unwrap(),
            &[Value::from(true), Value::from(false)]
        );
    }

    #[test]
    fn test_sum() {
        let library = Library::default();
        let budget = Budget::new(1.).with_delta(1e-5);
        let pipeline = Compiler::new(schema(), budget, PrivacyNotion::ApproxDP, &library)
            .compile(&[Step::sum("income", Gaussian)])
            .unwrap()
            .build();
        println!("{pipeline}");
        assert!(!pipeline.discrete());
        assert_eq!(pipeline.mechanism(), Gaussian);
        let loss = pipeline.measurement().privacy_loss(1.).unwrap();
        assert!(loss.within(&PrivacyLoss::Approximate(1., 1e-5)).unwrap());
    }

    #[test]
    fn test_trailing_rename() {
        let library = Library::default();
        let compiler = Compiler::new(schema(), Budget::new(0.5), PrivacyNotion::PureDP, &library)
            .compile(&[
                Step::select(["age", "job"]),
                Step::rename([("job", "occupation")]),
                Step::count("age", Laplace),
            ])
            .unwrap();
        let scale = compiler.pipeline().unwrap().scale();
        let compiler = compiler.step(&Step::rename([("age", "n")])).unwrap();
        let pipeline = compiler.pipeline().unwrap();
        assert_eq!(pipeline.label(), "n");
        assert_eq!(pipeline.scale(), scale);
        assert_eq!(pipeline.projection().len(), 2);
    }

    #[test]
    fn test_trailing_rename_onto_existing_column() {
        let library = Library::default();
        let compiler = Compiler::new(schema(), Budget::new(0.5), PrivacyNotion::PureDP, &library)
            .compile(&[Step::count("age", Laplace), Step::rename([("age", "job")])])
            .unwrap();
        let pipeline = compiler.pipeline().unwrap();
        println!("{pipeline}");
        assert_eq!(pipeline.label(), "job");
        assert!(compiler.try_build().is_ok());
    }

    #[test]
    fn test_not_ready() {
        let library = Library::default();
        let compiler = Compiler::new(schema(), Budget::new(0.5), PrivacyNotion::PureDP, &library)
            .compile(&[Step::select(["age"])])
            .unwrap();
        let err = compiler.pipeline().unwrap_err();
        assert_eq!(err, Error::syntax("noise not added"));
        assert_eq!(compiler.accuracy(0.95).unwrap_err().kind(), ErrorKind::Syntax);
        assert!(compiler.try_build().is_err());
    }
}
