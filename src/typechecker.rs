//! # Typechecker
//!
//! Runs the [`Grammar`] on the schema alone. No data is read and no noise is calibrated,
//! so checking a query is cheap enough to run before fetching its dataset.
//!

use crate::{
    grammar::{Grammar, Pass, Result, State},
    parameters::Parameters,
    query::{Budget, Mechanism, PrivacyNotion, Step},
    schema::Schema,
    value::Value,
};

/// A pass with no side effect
#[derive(Clone, Copy, Debug, Default)]
pub struct DryRun;

impl Pass for DryRun {}

/// The typechecker, a grammar driving a [`DryRun`]
#[derive(Clone, Debug)]
pub struct Typechecker {
    grammar: Grammar<DryRun>,
}

impl Typechecker {
    pub fn new(schema: Schema, budget: Budget, notion: PrivacyNotion) -> Self {
        Typechecker {
            grammar: Grammar::new(schema, budget, notion, DryRun),
        }
    }

    pub fn with_parameters(self, parameters: &Parameters) -> Self {
        Typechecker {
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

    pub fn select<S: Into<String>, I: IntoIterator<Item = S>>(self, columns: I) -> Result<Self> {
        self.step(&Step::select(columns))
    }

    pub fn filter<S: Into<String>, I: IntoIterator<Item = S>>(self, predicates: I) -> Result<Self> {
        self.step(&Step::filter(predicates))
    }

    pub fn rename<S: Into<String>, T: Into<String>, I: IntoIterator<Item = (S, T)>>(
        self,
        mapping: I,
    ) -> Result<Self> {
        self.step(&Step::rename(mapping))
    }

    pub fn bin<S: Into<String>, V: Into<Value>, I: IntoIterator<Item = V>>(
        self,
        column: S,
        bins: I,
    ) -> Result<Self> {
        self.step(&Step::bin(column, bins))
    }

    pub fn count<S: Into<String>>(self, column: S, mechanism: Mechanism) -> Result<Self> {
        self.step(&Step::count(column, mechanism))
    }

    pub fn sum<S: Into<String>>(self, column: S, mechanism: Mechanism) -> Result<Self> {
        self.step(&Step::sum(column, mechanism))
    }

    pub fn is_valid(&self) -> Result<()> {
        self.grammar.is_valid()
    }

    /// Check a whole query and return the schema it ends with
    pub fn check<'a, I: IntoIterator<Item = &'a Step>>(self, steps: I) -> Result<Schema> {
        let grammar = self.grammar.run(steps)?;
        grammar.is_valid()?;
        Ok(grammar.schema().clone())
    }
}

/// Validate a query against a schema, a budget and a privacy notion
pub fn validate(
    steps: &[Step],
    schema: &Schema,
    budget: &Budget,
    notion: PrivacyNotion,
) -> Result<()> {
    Typechecker::new(schema.clone(), *budget, notion)
        .check(steps)
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::{Ready, With},
        grammar::ErrorKind,
        schema::ColumnType,
    };
    use Mechanism::{Gaussian, Laplace};

    fn schema() -> Schema {
        Schema::builder()
            .with(("age", ColumnType::int(18, 90)))
            .with(("sex", ColumnType::enumeration(["F", "M"])))
            .with(("income", ColumnType::double(0., 150_000.)))
            .with(("name", ColumnType::text()))
            .build()
    }

    fn typechecker() -> Typechecker {
        Typechecker::new(schema(), Budget::new(0.1), PrivacyNotion::PureDP)
    }

    #[test]
    fn test_chain() {
        let typechecker = typechecker()
            .select(["age", "sex"])
            .unwrap()
            .filter(["age > 30", "sex == 'F'"])
            .unwrap()
            .bin("sex", ["F", "M"])
            .unwrap();
        assert!(matches!(typechecker.state(), State::AwaitingCount(_)));
        assert!(typechecker.is_valid().is_err());
        let typechecker = typechecker.count("sex", Laplace).unwrap();
        assert_eq!(typechecker.state(), &State::NoiseAdded);
        assert!(typechecker.is_valid().is_ok());
    }

    #[test]
    fn test_select_then_rename() {
        let typechecker = typechecker()
            .select(["age", "income"])
            .unwrap()
            .rename([("age", "x")])
            .unwrap();
        println!("schema = {}", typechecker.schema());
        assert_eq!(
            typechecker.schema().column_type("x").unwrap(),
            &ColumnType::int(18, 90)
        );
        assert_eq!(
            typechecker.schema().names().collect::<Vec<_>>(),
            vec!["x", "income"]
        );
    }

    #[test]
    fn test_validate() {
        let budget = Budget::new(0.1);
        let notion = PrivacyNotion::PureDP;
        assert!(validate(&[Step::count("age", Laplace)], &schema(), &budget, notion).is_ok());
        assert_eq!(
            validate(&[Step::sum("name", Laplace)], &schema(), &budget, notion)
                .unwrap_err()
                .kind(),
            ErrorKind::Type
        );
        assert_eq!(
            validate(
                &[Step::count("age", Gaussian)],
                &schema(),
                &Budget::new(0.1).with_delta(0.),
                PrivacyNotion::ApproxDP
            )
            .unwrap_err()
            .kind(),
            ErrorKind::Compatibility
        );
        assert_eq!(
            validate(&[Step::select(["age"])], &schema(), &budget, notion)
                .unwrap_err()
                .kind(),
            ErrorKind::Syntax
        );
    }

    #[test]
    fn test_category_cap() {
        let steps = [Step::bin("age", [0, 1000]), Step::count("age", Laplace)];
        let budget = Budget::new(1.);
        assert!(validate(&steps, &schema(), &budget, PrivacyNotion::PureDP).is_ok());
        let capped = Typechecker::new(schema(), budget, PrivacyNotion::PureDP)
            .with_parameters(&Parameters::default().with_max_categories(100))
            .check(&steps);
        assert_eq!(capped.unwrap_err().kind(), ErrorKind::Unsupported);
    }
}
