//! Running compiled pipelines on data, and their accuracy

use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::collections::BTreeMap;

use super::CompiledPipeline;
use crate::{
    dataset::Dataset,
    grammar::{Error, Result},
    mechanisms::{Aggregate, MechanismLibrary},
    value::Value,
};

/// A noised value
#[derive(Clone, Debug, PartialEq)]
pub enum Release {
    Integer(i64),
    Float(f64),
    /// Noised counts, in category order
    Histogram(Vec<(Value, i64)>),
}

impl Serialize for Release {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Release::Integer(value) => serializer.serialize_i64(*value),
            Release::Float(value) => serializer.serialize_f64(*value),
            Release::Histogram(counts) => {
                let mut map = serializer.serialize_map(Some(counts.len()))?;
                for (category, count) in counts {
                    map.serialize_entry(&category.to_string(), count)?;
                }
                map.end()
            }
        }
    }
}

/// The result label mapped to its release
pub type Evaluation = BTreeMap<String, Release>;

/// Evaluate with the seeded generator of the pipeline, or fresh entropy
pub fn evaluate(pipeline: &CompiledPipeline, data: &Dataset) -> Result<Evaluation> {
    let mut rng = match pipeline.seed() {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    evaluate_with_rng(pipeline, data, &mut rng)
}

pub fn evaluate_with_rng(
    pipeline: &CompiledPipeline,
    data: &Dataset,
    rng: &mut dyn RngCore,
) -> Result<Evaluation> {
    let projected = pipeline.project(data.clone())?;
    log::debug!(
        "evaluating {} on {} rows",
        pipeline.measurement(),
        projected.len()
    );
    let release = match (pipeline.measurement().invoke(&projected, rng)?, pipeline.categories()) {
        (Aggregate::Counts(counts), Some(categories)) => {
            if counts.len() != categories.len() {
                return Err(Error::upstream(format!(
                    "{} counts returned for {} categories",
                    counts.len(),
                    categories.len()
                )));
            }
            Release::Histogram(categories.iter().cloned().zip(counts).collect())
        }
        (Aggregate::Integer(value), None) => Release::Integer(value),
        (Aggregate::Float(value), None) => Release::Float(value),
        (aggregate, _) => {
            return Err(Error::upstream(format!(
                "unexpected aggregate {aggregate:?} for {}",
                pipeline.measurement()
            )))
        }
    };
    Ok(BTreeMap::from([(pipeline.label().to_string(), release)]))
}

/// The bound on the noise at `confidence`
pub fn accuracy(
    pipeline: &CompiledPipeline,
    library: &dyn MechanismLibrary,
    confidence: f64,
) -> Result<f64> {
    if !(confidence > 0. && confidence < 1.) {
        return Err(Error::format(format!(
            "confidence must be in (0, 1), got {confidence}"
        )));
    }
    Ok(library.scale_to_accuracy(
        pipeline.scale(),
        1. - confidence,
        pipeline.discrete(),
        pipeline.mechanism(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::{Ready, With},
        compiler::Compiler,
        mechanisms::Library,
        parameters::Parameters,
        query::{Budget, Mechanism, PrivacyNotion, Step},
        schema::{ColumnType, Schema},
    };

    const PEOPLE: &str = "\
age,job,married
20,Baker,true
35,Carpenter,false
35,Baker,true
52,Teacher,false
";

    fn schema() -> Schema {
        Schema::builder()
            .with(("age", ColumnType::int(18, 90)))
            .with(("job", ColumnType::text()))
            .with(("married", ColumnType::boolean()))
            .build()
    }

    fn pipeline(steps: &[Step], budget: Budget) -> CompiledPipeline {
        Compiler::new(schema(), budget, PrivacyNotion::PureDP, &Library::default())
            .with_parameters(&Parameters::default().with_seed(42))
            .compile(steps)
            .unwrap()
            .build()
    }

    #[test]
    fn test_seeded_evaluation() {
        let data = Dataset::from_csv(PEOPLE, &schema()).unwrap();
        let pipeline = pipeline(
            &[Step::filter(["job == 'Baker'"]), Step::count("age", Mechanism::Laplace)],
            Budget::new(1000.),
        );
        let first = evaluate(&pipeline, &data).unwrap();
        println!("{}", serde_json::to_string(&first).unwrap());
        assert_eq!(first, evaluate(&pipeline, &data).unwrap());
        // Noise at scale 1e-3 rounds to nothing
        assert_eq!(first["age"], Release::Integer(2));
    }

    #[test]
    fn test_histogram() {
        let data = Dataset::from_csv(PEOPLE, &schema()).unwrap();
        let pipeline = pipeline(
            &[Step::bin("job", ["Baker", "Teacher"]), Step::count("job", Mechanism::Laplace)],
            Budget::new(1000.),
        );
        let evaluation = evaluate(&pipeline, &data).unwrap();
        assert_eq!(
            evaluation["job"],
            Release::Histogram(vec![("Baker".into(), 2), ("Teacher".into(), 1)])
        );
        assert_eq!(
            serde_json::to_string(&evaluation).unwrap(),
            r#"{"job":{"Baker":2,"Teacher":1}}"#
        );
    }

    #[test]
    fn test_accuracy() {
        let pipeline = pipeline(&[Step::sum("age", Mechanism::Laplace)], Budget::new(1.));
        let library = Library::default();
        let bound = accuracy(&pipeline, &library, 0.95).unwrap();
        println!("bound = {bound}");
        assert!(bound > 0.);
        assert!(accuracy(&pipeline, &library, 0.99).unwrap() > bound);
        assert!(accuracy(&pipeline, &library, 1.).is_err());
    }
}
