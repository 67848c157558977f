use itertools::Itertools;
use querydp::{
    dataset::{
        self,
        provider::{DatasetId, DatasetProvider, InMemoryProvider},
    },
    mechanisms::Library,
    query::{AccuracyRequest, QueryRequest},
    service::{self, QueryService},
    setup, typechecker, Budget, ColumnType, Compiler, ErrorKind, Mechanism, Parameters,
    PrivacyNotion, Ready, Release, Schema, Step, Typechecker, Value, With,
};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

const CENSUS: &str = "\
age,job,income,married,salary
25,Carpenter,32000.5,true,1500.0
42,Baker,,false,24000.0
67,Carpenter,41000,True,
19,Teacher,28000,false,3000.0
33,Baker,51000,true,12000.0
45,Teacher,38000,false,9000.0
";

fn schema() -> Schema {
    Schema::builder()
        .with(("age", ColumnType::int(18, 90)))
        .with(("job", ColumnType::text()))
        .with(("income", ColumnType::double(0., 150_000.)))
        .with(("married", ColumnType::boolean()))
        .with(("salary", ColumnType::double(0., 100_000.)))
        .build()
}

fn kind(steps: &[Step], budget: Budget, notion: PrivacyNotion) -> Option<ErrorKind> {
    typechecker::validate(steps, &schema(), &budget, notion)
        .err()
        .map(|err| err.kind())
}

#[test]
fn test_scenarios() {
    setup::init();
    use Mechanism::{Gaussian, Laplace};
    let pure = Budget::new(0.1);
    // Row count
    let steps = [Step::count("age", Laplace)];
    assert_eq!(kind(&steps, pure, PrivacyNotion::PureDP), None);
    let library = Library::default();
    let pipeline = Compiler::new(schema(), pure, PrivacyNotion::PureDP, &library)
        .compile(&steps)
        .unwrap()
        .build();
    assert!(pipeline.categories().is_none());
    assert_eq!(pipeline.label(), "age");
    // Integer histogram
    let steps = [Step::bin("age", [10, 45]), Step::count("age", Laplace)];
    assert_eq!(kind(&steps, pure, PrivacyNotion::PureDP), None);
    let evaluation =
        service::compile_and_evaluate(&steps, &schema(), &pure, PrivacyNotion::PureDP, CENSUS)
            .unwrap();
    match &evaluation["age"] {
        Release::Histogram(counts) => {
            assert_eq!(counts.len(), 36);
            assert!(counts.iter().map(|(category, _)| category).all_unique());
            assert_eq!(counts[0].0, Value::from(10));
            assert_eq!(counts[35].0, Value::from(45));
        }
        release => panic!("unexpected release {release:?}"),
    }
    // Sum of a text column
    assert_eq!(
        kind(&[Step::sum("job", Laplace)], pure, PrivacyNotion::PureDP),
        Some(ErrorKind::Type)
    );
    // Gaussian without delta
    assert_eq!(
        kind(
            &[Step::count("age", Gaussian)],
            Budget::new(0.1).with_delta(0.),
            PrivacyNotion::ApproxDP
        ),
        Some(ErrorKind::Compatibility)
    );
    // Laplace with delta
    assert_eq!(
        kind(
            &[Step::count("age", Laplace)],
            Budget::new(0.4).with_delta(0.001),
            PrivacyNotion::ApproxDP
        ),
        Some(ErrorKind::Compatibility)
    );
    // Binning a double
    assert_eq!(
        kind(
            &[Step::bin("salary", [1000.0, 25000.0]), Step::count("salary", Laplace)],
            pure,
            PrivacyNotion::PureDP
        ),
        Some(ErrorKind::Unsupported)
    );
}

/// The census columns and one whose sums cannot be calibrated
fn corpus_schema() -> Schema {
    let mut columns = schema().columns().to_vec();
    columns.push(("huge", ColumnType::double(0., 1e308)).into());
    Schema::new(columns).unwrap()
}

/// Candidate steps, legal or not
fn corpus() -> Vec<Step> {
    use Mechanism::{Gaussian, Laplace};
    vec![
        Step::select(["age", "job"]),
        Step::select(["wage"]),
        Step::filter(["age > 30 and job != 'Baker'"]),
        Step::filter(["age >"]),
        Step::rename([("job", "occupation")]),
        Step::rename([("job", "age")]),
        Step::bin("age", [20, 40]),
        Step::bin("job", ["Baker", "Teacher"]),
        Step::bin("salary", [1.0, 2.0]),
        Step::count("age", Laplace),
        Step::count("job", Gaussian),
        Step::sum("income", Laplace),
        Step::sum("age", Gaussian),
        Step::sum("job", Laplace),
        Step::sum("huge", Laplace),
        Step::sum("huge", Gaussian),
    ]
}

#[test]
fn test_typechecker_and_compiler_agree() {
    let budgets = [
        (Budget::new(0.5), PrivacyNotion::PureDP),
        (Budget::new(0.5).with_delta(1e-5), PrivacyNotion::ApproxDP),
        (Budget::new(0.5).with_delta(0.), PrivacyNotion::ApproxDP),
    ];
    let library = Library::default();
    let corpus = corpus();
    let mut accepted = 0;
    let mut total = 0;
    for length in 1..=3 {
        for steps in (0..length)
            .map(|_| corpus.iter().cloned())
            .multi_cartesian_product()
        {
            for (budget, notion) in budgets {
                total += 1;
                let checked = Typechecker::new(corpus_schema(), budget, notion).check(&steps);
                let compiled = Compiler::new(corpus_schema(), budget, notion, &library)
                    .compile(&steps)
                    .and_then(|compiler| compiler.try_build());
                match (&checked, &compiled) {
                    (Ok(_), Ok(_)) => accepted += 1,
                    (Err(expected), Err(err)) => assert_eq!(
                        expected.kind(),
                        err.kind(),
                        "{} under {budget}",
                        steps.iter().join(", ")
                    ),
                    _ => panic!(
                        "{} under {budget}: typechecker {checked:?}, compiler {:?}",
                        steps.iter().join(", "),
                        compiled.as_ref().map(|pipeline| pipeline.scale())
                    ),
                }
            }
        }
    }
    println!("{accepted} accepted out of {total}");
    assert!(accepted > 0 && accepted < total);
}

#[test]
fn test_calibration_is_deterministic() {
    let library = Library::default();
    let budget = Budget::new(0.7).with_delta(1e-6);
    let steps = [
        Step::filter(["married"]),
        Step::sum("income", Mechanism::Gaussian),
    ];
    let scale = || {
        Compiler::new(schema(), budget, PrivacyNotion::ApproxDP, &library)
            .compile(&steps)
            .unwrap()
            .build()
            .scale()
    };
    let first = scale();
    println!("scale = {first}");
    assert_eq!(first, scale());
}

#[test]
fn test_select_then_rename() {
    let schema = Typechecker::new(schema(), Budget::new(1.), PrivacyNotion::PureDP)
        .select(["age", "job"])
        .unwrap()
        .rename([("age", "x")])
        .unwrap()
        .schema()
        .clone();
    assert_eq!(schema.names().collect::<Vec<_>>(), vec!["x", "job"]);
    assert_eq!(schema.column_type("x").unwrap(), &ColumnType::int(18, 90));
    assert_eq!(schema.column_type("job").unwrap(), &ColumnType::text());
}

#[test]
fn test_seeded_evaluation() {
    let provider = InMemoryProvider::new().with((3, CENSUS));
    let service = QueryService::new(provider, Parameters::default().with_seed(1234));
    let request = QueryRequest::from_json(
        r#"{
            "budget": {"epsilon": 1000.0},
            "query": [
                {"filter": ["job == 'Carpenter' or income < 30000"]},
                {"rename": {"married": "wed"}},
                {"bin": {"wed": [true, false]}},
                {"count": {"column": "wed", "mech": "Laplace"}},
                {"rename": {"wed": "spouse"}}
            ],
            "privacy_notion": "PureDP",
            "dataset": 3,
            "schema": [
                {"name": "age", "type": {"name": "Int", "low": 18, "high": 90}},
                {"name": "job", "type": {"name": "Text"}},
                {"name": "income", "type": {"name": "Double", "low": 0.0, "high": 150000.0}},
                {"name": "married", "type": {"name": "Bool"}}
            ]
        }"#,
    )
    .unwrap();
    assert!(service.validate(&request).valid);
    let evaluation = service.evaluate(&request).unwrap();
    let json = serde_json::to_string(&evaluation).unwrap();
    println!("{json}");
    assert_eq!(json, r#"{"spouse":{"true":2,"false":1}}"#);
    assert_eq!(service.evaluate(&request).unwrap(), evaluation);
    let accuracy = service
        .accuracy(&AccuracyRequest::new(request.clone(), 0.95).unwrap())
        .unwrap();
    assert!(accuracy >= 0.);
    assert!(AccuracyRequest::new(request, 1.5).is_err());
}

#[derive(Default)]
struct Counting {
    fetches: AtomicUsize,
}

impl DatasetProvider for Counting {
    fn get_rows(&self, dataset: DatasetId) -> dataset::Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(std::time::Duration::from_millis(10));
        match dataset {
            1 | 2 => Ok(CENSUS.to_string()),
            _ => Err(dataset::Error::unknown_dataset(dataset)),
        }
    }
}

#[test]
fn test_concurrent_queries() {
    let service = QueryService::new(Counting::default(), Parameters::default());
    let request = |dataset: DatasetId| QueryRequest {
        budget: Budget::new(1.),
        query: vec![Step::sum("age", Mechanism::Laplace)],
        privacy_notion: PrivacyNotion::PureDP,
        dataset,
        schema: schema().columns().to_vec(),
    };
    thread::scope(|scope| {
        for i in 0..8 {
            let service = &service;
            scope.spawn(move || {
                let dataset = 1 + i % 2;
                assert!(service.evaluate(&request(dataset)).is_ok());
            });
        }
    });
    assert_eq!(service.provider().provider().fetches.load(Ordering::SeqCst), 2);
    let err = service.evaluate(&request(9)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(service.evict(1));
    assert!(service.evaluate(&request(1)).is_ok());
    assert_eq!(service.provider().provider().fetches.load(Ordering::SeqCst), 4);
}

#[test]
fn test_invalid_query_is_not_fetched() {
    let service = QueryService::new(Counting::default(), Parameters::default());
    let request = QueryRequest {
        budget: Budget::new(1.),
        query: vec![Step::select(["age"])],
        privacy_notion: PrivacyNotion::PureDP,
        dataset: 1,
        schema: schema().columns().to_vec(),
    };
    let validation = service.validate(&request);
    println!("{}", serde_json::to_string(&validation).unwrap());
    assert!(!validation.valid);
    assert_eq!(service.evaluate(&request).unwrap_err().kind(), ErrorKind::Syntax);
    assert_eq!(service.provider().provider().fetches.load(Ordering::SeqCst), 0);
}
