use data_pipeline::data::{DataSource, Fetch};
use data_pipeline::error::Result as PipelineResult;
use data_pipeline::{
    DatasetDescriptor, Pipeline, PipelineConfig, PipelineError, Stage, TableStore,
    VerificationResult, Verifier,
};
use std::path::Path;
use tempfile::TempDir;

const TITANIC_SAMPLE: &str = "\
PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked
1,0,3,\"Braund, Mr. Owen Harris\",male,22,1,0,A/5 21171,7.25,,S
2,1,1,\"Cumings, Mrs. John Bradley\",female,38,1,0,PC 17599,71.2833,C85,C
3,1,3,,female,26,0,0,STON/O2. 3101282,7.925,,S
4,1,1,\"Futrelle, Mrs. Jacques Heath\",female,35,1,0,113803,53.1,C123,S
5,0,3,\"Allen, Mr. William Henry\",male,,0,0,373450,8.05,,S
";

/// Serves a fixed body for every URL, or refuses the connection.
struct StubFetcher(Option<&'static str>);

impl Fetch for StubFetcher {
    fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>> {
        self.0
            .map(|body| body.as_bytes().to_vec())
            .ok_or_else(|| PipelineError::SourceUnavailable(format!("{url}: connection refused")))
    }
}

fn setup(body: Option<&'static str>) -> (TempDir, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::default().rooted_at(dir.path());
    let source = DataSource::new(config.raw_dir(), Box::new(StubFetcher(body)));
    (dir, Pipeline::with_source(config, source))
}

fn open_store(pipeline: &Pipeline) -> TableStore {
    TableStore::open_existing(pipeline.config().database_path()).unwrap()
}

#[test]
fn default_run_produces_charts_report_and_a_verified_table() {
    let (_dir, pipeline) = setup(None);

    let outcome = pipeline.run(&DatasetDescriptor::Default).unwrap();

    assert_eq!(outcome.dataset, "iris");
    assert_eq!(outcome.expectation.row_count, 150);
    assert_eq!(outcome.cleaning.dropped_count(), 0);
    assert!(!outcome.artifacts.is_empty());
    assert!(outcome.artifacts.iter().all(|a| a.path.exists()));
    assert!(outcome.report.report.path.exists());
    assert!(outcome.report.exports.iter().all(|a| a.path.exists()));

    let store = open_store(&pipeline);
    let report = Verifier::new(&store).verify_recorded("iris").unwrap();
    assert_eq!(report.result, VerificationResult::CheckedOk);
}

#[test]
fn unknown_preset_fails_at_ingest_and_leaves_no_database() {
    let (_dir, pipeline) = setup(None);

    let err = pipeline
        .run(&DatasetDescriptor::Preset("nonexistent_dataset_xyz".into()))
        .unwrap_err();

    assert_eq!(err.stage, Stage::Ingest);
    assert!(matches!(err.error, PipelineError::SourceUnavailable(_)));
    assert!(!pipeline.config().database_path().exists());
}

#[test]
fn unreachable_url_fails_at_ingest() {
    let (_dir, pipeline) = setup(None);

    let err = pipeline
        .run(&DatasetDescriptor::Url("https://example.invalid/data.csv".into()))
        .unwrap_err();

    assert_eq!(err.stage, Stage::Ingest);
    assert!(matches!(err.error, PipelineError::SourceUnavailable(_)));
}

#[test]
fn malformed_row_is_dropped_and_counted() {
    let (_dir, pipeline) = setup(Some(TITANIC_SAMPLE));

    let outcome = pipeline
        .run(&DatasetDescriptor::Preset("titanic".into()))
        .unwrap();

    assert_eq!(outcome.raw_rows, 5);
    assert_eq!(outcome.cleaning.dropped_count(), 1);
    assert_eq!(outcome.cleaning.dropped[0].row, 3);
    assert_eq!(outcome.expectation.row_count, 4);
    assert!(outcome
        .cleaning
        .imputed
        .iter()
        .any(|(column, filled)| column == "age" && *filled == 1));

    let report = std::fs::read_to_string(&outcome.report.report.path).unwrap();
    assert!(report.contains("- Rows dropped: 1"));
}

#[test]
fn url_dataset_is_named_after_the_file() {
    let (_dir, pipeline) = setup(Some("City Name,Population\nOslo,700000\nBergen,290000\nTromso,77000\n"));

    let outcome = pipeline
        .run(&DatasetDescriptor::Url("https://example.com/files/Cities.csv?raw=1".into()))
        .unwrap();

    assert_eq!(outcome.dataset, "cities");
    assert_eq!(outcome.expectation.row_count, 3);
    assert!(outcome
        .expectation
        .columns
        .iter()
        .any(|(name, _)| name == "city_name"));
    assert!(Path::new(&outcome.raw_path).ends_with("raw/cities.csv"));
}

#[test]
fn categorical_only_dataset_records_chart_failures() {
    let (_dir, pipeline) = setup(Some("color,shape\nred,circle\nblue,square\nred,square\n"));

    let outcome = pipeline
        .run(&DatasetDescriptor::Url("https://example.com/shapes.csv".into()))
        .unwrap();

    assert_eq!(outcome.artifacts.len(), 2);
    assert!(outcome
        .chart_failures
        .iter()
        .any(|f| f.reason.contains("no numeric columns")));
    assert!(!outcome.caveats().is_empty());
}

#[test]
fn rerun_replaces_the_stored_table() {
    let (_dir, pipeline) = setup(None);

    pipeline.run(&DatasetDescriptor::Default).unwrap();
    pipeline.run(&DatasetDescriptor::Preset("IRIS".into())).unwrap();

    let store = open_store(&pipeline);
    assert_eq!(store.tables().unwrap(), vec!["iris".to_string()]);
    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].row_count, 150);
}

#[test]
fn stored_table_round_trips() {
    let (_dir, pipeline) = setup(Some(TITANIC_SAMPLE));
    let outcome = pipeline
        .run(&DatasetDescriptor::Preset("titanic".into()))
        .unwrap();

    let store = open_store(&pipeline);
    let loaded = store.load("titanic").unwrap();
    assert_eq!(loaded.fingerprint(), outcome.expectation.fingerprint);
    assert_eq!(loaded.schema().len(), 12);
}

#[test]
fn verifying_an_unknown_dataset_is_not_found() {
    let (_dir, pipeline) = setup(None);
    pipeline.run(&DatasetDescriptor::Default).unwrap();

    let store = open_store(&pipeline);
    let err = Verifier::new(&store).verify_recorded("titanic").unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[test]
fn cleaned_table_is_written_to_processed_dir() {
    let (_dir, pipeline) = setup(None);

    let outcome = pipeline.run(&DatasetDescriptor::Default).unwrap();

    assert!(outcome.cleaned_path.ends_with("processed/iris_cleaned.csv"));
    let text = std::fs::read_to_string(&outcome.cleaned_path).unwrap();
    assert_eq!(text.lines().count(), 151);
    let report = std::fs::read_to_string(&outcome.report.report.path).unwrap();
    assert!(report.contains("iris_cleaned.csv"));
}

#[test]
fn column_named_column_still_gets_a_report() {
    let (_dir, pipeline) = setup(Some("column,value\n1,2\n2,4.5\n3,5\n4,9\n"));

    let outcome = pipeline
        .run(&DatasetDescriptor::Url("https://example.com/pairs.csv".into()))
        .unwrap();

    let export = outcome
        .report
        .exports
        .iter()
        .find(|a| a.path.ends_with("pairs_correlation_matrix.csv"))
        .unwrap();
    let csv = std::fs::read_to_string(&export.path).unwrap();
    assert!(csv.starts_with("_column,column,value"));
}

#[test]
fn headers_equal_ignoring_case_are_made_unique() {
    let (_dir, pipeline) = setup(Some("A,a\n1,2\n3,4\n"));

    let outcome = pipeline
        .run(&DatasetDescriptor::Url("https://example.com/pairs.csv".into()))
        .unwrap();

    let names: Vec<&str> = outcome.expectation.columns.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "a_2"]);
    assert_eq!(outcome.expectation.row_count, 2);
}
