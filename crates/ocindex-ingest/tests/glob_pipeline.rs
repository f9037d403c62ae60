//! End-to-end runs of the glob builder over a tabular cache.

use std::path::Path;
use std::sync::Arc;

use ocindex_core::finder::mock::{MockFinder, MockResponse};
use ocindex_core::identifier::{ValidityMemo, manager_for};
use ocindex_core::{
    CitationData, CsvDataSource, DataSource, FinderChain, ResolutionRecord, ResourceFinder,
    Scheme,
};
use ocindex_ingest::{GlobBuilder, ParserKind, emit_citations, parser_for};

const CROSSREF_DUMP: &str =
    r#"{"items":[{"DOI":"10.1/A","reference":[{"DOI":"10.2/B"},{"DOI":"bad"}]}]}"#;

fn glob(kind: ParserKind, cache: Arc<dyn DataSource>, finder: Arc<MockFinder>) -> GlobBuilder {
    let scheme = kind.scheme();
    let chain = FinderChain::new(
        scheme,
        manager_for(scheme, None, ValidityMemo::none()),
        vec![finder as Arc<dyn ResourceFinder>],
    );
    GlobBuilder::new(kind, Arc::new(chain), cache).with_workers(2, 2)
}

fn relation(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(name))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn crossref_dump_to_citation_csv() {
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("crossref.json");
    std::fs::write(&input, CROSSREF_DUMP).unwrap();
    let glob_dir = work.path().join("coci");

    let finder = Arc::new(MockFinder::new(
        "Crossref",
        Scheme::Doi,
        MockResponse::Found(
            ResolutionRecord::valid()
                .with_date("2018-02-13")
                .with_issn("0317-8471"),
        ),
    ));
    let cache: Arc<dyn DataSource> = Arc::new(CsvDataSource::open(&glob_dir).unwrap());
    let out = glob(ParserKind::Crossref, cache.clone(), finder)
        .run(&input)
        .await
        .unwrap();

    assert_eq!(out.tuples, vec![CitationData::new("10.1/a", "10.2/b")]);

    // the four relation files are on disk after the run
    let mut valid = relation(&glob_dir, "valid_id.csv");
    valid.sort();
    assert_eq!(
        valid,
        vec![
            "\"doi:10.1/a\",\"v\"",
            "\"doi:10.2/b\",\"v\"",
            "\"id\",\"value\"",
        ]
    );
    assert_eq!(relation(&glob_dir, "id_issn.csv").len(), 3);
    assert_eq!(relation(&glob_dir, "id_orcid.csv").len(), 3);

    let report = emit_citations(&out.tuples, Scheme::Doi, cache.as_ref(), work.path()).unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(
        std::fs::read_to_string(work.path().join("citations.csv")).unwrap(),
        "citing,cited,citing_date,cited_date,journal_sc,author_sc\n\
         doi:10.1/a,doi:10.2/b,2018-02-13,2018-02-13,yes,\n"
    );
}

#[tokio::test]
async fn reloaded_glob_skips_finders_and_reparses_identically() {
    let work = tempfile::tempdir().unwrap();
    let input = work.path().join("dump");
    std::fs::create_dir(&input).unwrap();
    std::fs::write(
        input.join("part.csv"),
        "citing_id,cited_id,citing_publication_date,cited_publication_date\n\
         10.1/a,10.2/b,2020,\n\
         10.1/a,10.3/c,,\n",
    )
    .unwrap();
    let glob_dir = work.path().join("croci");

    let first_finder = Arc::new(MockFinder::new(
        "Crossref",
        Scheme::Doi,
        MockResponse::Found(ResolutionRecord::valid()),
    ));
    let first = {
        let cache: Arc<dyn DataSource> = Arc::new(CsvDataSource::open(&glob_dir).unwrap());
        glob(ParserKind::Crowdsourced, cache, first_finder.clone())
            .run(&input)
            .await
            .unwrap()
    };
    assert_eq!(first_finder.call_count(), 3);

    let reloaded = Arc::new(CsvDataSource::open(&glob_dir).unwrap());
    assert_eq!(reloaded.len(), 3);
    assert!(reloaded.get("doi:10.1/a").unwrap().unwrap().date.contains("2020"));

    let second_finder = Arc::new(MockFinder::new(
        "Crossref",
        Scheme::Doi,
        MockResponse::NotFound,
    ));
    let second = glob(ParserKind::Crowdsourced, reloaded, second_finder.clone())
        .run(&input)
        .await
        .unwrap();

    assert_eq!(second_finder.call_count(), 0);
    assert_eq!(second.report.cache_hits, 3);
    assert_eq!(second.report.valid, 3);
    assert_eq!(second.tuples, first.tuples);

    // emitted rows parse back into the same pairs
    let cache = CsvDataSource::open(&glob_dir).unwrap();
    emit_citations(&first.tuples, Scheme::Doi, &cache, work.path()).unwrap();
    let emitted = std::fs::read(work.path().join("citations.csv")).unwrap();
    let rows = std::str::from_utf8(&emitted)
        .unwrap()
        .replace(
            "citing,cited,citing_date,cited_date",
            "citing_id,cited_id,citing_publication_date,cited_publication_date",
        );
    let mut parser = parser_for(ParserKind::Crowdsourced);
    parser.parse_bytes(rows.as_bytes()).unwrap();
    let pairs: Vec<_> = parser
        .collect_all()
        .into_iter()
        .map(|c| (c.citing, c.cited))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("10.1/a".to_string(), "10.2/b".to_string()),
            ("10.1/a".to_string(), "10.3/c".to_string()),
        ]
    );
}
