use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{HumanCount, MultiProgress, ProgressBar, ProgressStyle};
use ocindex_core::{CitationData, Config, CsvDataSource, DataSource, Scheme, config_file};
use ocindex_ingest::{
    CitationStorer, EmitReport, GlobBuilder, GlobOutput, GlobProgress, IngestError, LOOKUP_FILE,
    OciLookup, OciMinter, OmidMap, ParserKind, StorerSettings,
};
use ocindex_rdf::{EditMode, InputType, MemoryListStore, RdfProgress, RedisListStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// OpenCitations Index - ingest citation dumps and maintain the index triples
#[derive(Parser, Debug)]
#[command(name = "ocindex", version, about, long_about = None)]
struct Cli {
    /// Config file to read instead of ~/.opencitations/index/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a service dump, resolve every identifier and write the glob
    Glob {
        /// Dump directory, archive or tar.gz
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the cache tables and citations.csv
        #[arg(short, long)]
        output: PathBuf,

        /// Service tag as configured, e.g. coci or doci
        #[arg(short, long, default_value = "coci")]
        service: String,

        /// Directory holding the OpenCitations Meta data map (needed by ocmeta)
        #[arg(long)]
        meta: Option<PathBuf>,

        /// Only fill the cache; do not write citations
        #[arg(long)]
        no_emit: bool,

        /// Store OCI-keyed citations (CSV, RDF, Scholix) under this directory
        /// instead of writing citations.csv
        #[arg(long)]
        store: Option<PathBuf>,

        /// Identifier to OMID map (CSV directory or archive) used by the openaire parser
        #[arg(long)]
        omid_map: Option<PathBuf>,

        /// Responsible agent recorded in the provenance of stored citations
        #[arg(long, default_value = DEFAULT_AGENT)]
        agent: String,

        /// Primary source recorded in the provenance (defaults to the input path)
        #[arg(long)]
        source: Option<String>,
    },

    /// Keep only the citations whose OCI is not indexed yet
    Validate {
        /// Directory of citation CSVs with citing and cited columns
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the filtered CSVs
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, default_value = "coci")]
        service: String,

        /// Indexed citation CSVs with an oci column (directory or archive)
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Extract (citation, source) tables from zipped triple dumps
    Rdf2csv {
        /// Directory with the zipped dumps
        input: PathBuf,

        /// Directory receiving one CSV per dump
        output: PathBuf,
    },

    /// Count distinct citing entities per cited entity
    #[command(alias = "citationcount_dump_gen")]
    CitationCount {
        #[arg(short, long)]
        input: PathBuf,

        /// rdf (triple files) or csv (rdf2csv tables)
        #[arg(short = 't', long = "type", default_value = "rdf")]
        input_type: InputType,

        /// Directory receiving citations.csv
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// How many of the most cited entities to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Push cited -> citing lists for every triple file into the key-value server
    GlobalIndex {
        #[arg(short, long)]
        input: PathBuf,

        /// Operations per pipeline (defaults to [redis] batch_size)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Collect the lists in memory instead of pushing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Rewrite triple dumps for the unified index or for one service
    EditRdf {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// `index`, or a service tag such as `coci`
        #[arg(short, long)]
        mode: EditMode,
    },

    /// Print the largest value found at a metadata field across a Crossref dump
    CheckMetadata {
        #[arg(short, long)]
        input: PathBuf,

        /// Field path, nested keys separated by `=>`
        #[arg(short = 'm', long = "metadata")]
        field: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let color = ColorMode(!cli.no_color);

    match cli.command {
        Command::Glob {
            input,
            output,
            service,
            meta,
            no_emit,
            store,
            omid_map,
            agent,
            source,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let emission = match (no_emit, store) {
                (true, _) => Emission::None,
                (false, None) => Emission::Table,
                (false, Some(dir)) => Emission::Store {
                    source: source.unwrap_or_else(|| input.display().to_string()),
                    dir,
                    agent,
                },
            };
            glob(config, &input, &output, &service, meta, omid_map, emission, color).await
        }
        Command::Validate {
            input,
            output,
            service,
            index,
        } => {
            let config = load_config(cli.config.as_deref())?;
            validate(&config, input, output, &service, index, color).await
        }
        Command::Rdf2csv { input, output } => rdf2csv(input, output).await,
        Command::CitationCount {
            input,
            input_type,
            output,
            top,
        } => citation_count(input, input_type, output, top, color).await,
        Command::GlobalIndex {
            input,
            batch_size,
            dry_run,
        } => {
            let config = load_config(cli.config.as_deref())?;
            global_index(&config, input, batch_size, dry_run, color).await
        }
        Command::EditRdf {
            input,
            output,
            mode,
        } => edit_rdf(input, output, mode, color).await,
        Command::CheckMetadata { input, field } => check_metadata(input, field, color).await,
    }
}

const DEFAULT_AGENT: &str = "https://w3id.org/oc/index/prov/pa/1";

/// What a glob run does with its valid citations.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Emission {
    None,
    Table,
    Store {
        dir: PathBuf,
        agent: String,
        source: String,
    },
}

fn unknown_service(config: &Config, service: &str) -> anyhow::Error {
    let mut known: Vec<&String> = config.services.keys().collect();
    known.sort();
    anyhow::anyhow!(
        "unknown service: {} (configured: {})",
        service,
        known.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    )
}

/// The identifier scheme and OCI prefix of a configured service.
fn service_oci(config: &Config, tag: &str) -> anyhow::Result<(Scheme, String)> {
    let service = config.service(tag).ok_or_else(|| unknown_service(config, tag))?;
    let kind: ParserKind = service.parser.parse().map_err(anyhow::Error::msg)?;
    Ok((kind.scheme(), service.prefix.clone()))
}

/// Store the citations of a glob run and extend the OCI lookup table.
/// OCIs already stored under `dir` are skipped.
fn store_glob(
    tuples: &[CitationData],
    scheme: Scheme,
    prefix: String,
    cache: &dyn DataSource,
    lookup: &Path,
    dir: &Path,
    settings: StorerSettings,
) -> Result<EmitReport, IngestError> {
    let stored = dir.join("data").join("csv");
    let existing = if stored.is_dir() {
        ocindex_ingest::known_ocis(&stored)?
    } else {
        HashSet::new()
    };
    let mut minter = OciMinter::new(scheme, prefix, OciLookup::load(lookup)?);
    let mut storer = CitationStorer::open(dir, settings)?;
    let report =
        ocindex_ingest::store_citations(tuples, scheme, cache, &mut minter, &mut storer, &existing)?;
    storer.finish()?;
    minter.lookup_mut().save(lookup)?;
    Ok(report)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let file = match path {
        Some(path) => config_file::load_from_path(path)
            .with_context(|| format!("cannot read config {}", path.display()))?,
        None => config_file::load_config(),
    };
    Ok(config_file::to_config(&file))
}

fn spinner(msg: &str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn bar_style() -> Option<ProgressStyle> {
    ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len} (eta {eta})")
        .ok()
        .map(|s| s.progress_chars("=> "))
}

/// Switch a spinner to a bar once the total is known.
fn set_total(bar: &ProgressBar, total: usize) {
    bar.set_length(total as u64);
    if let Some(style) = bar_style() {
        bar.set_style(style);
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Progress callback shared by the triple-dump commands.
fn rdf_progress(bar: ProgressBar) -> impl FnMut(RdfProgress) + Send + 'static {
    move |event| match event {
        RdfProgress::Discovered { files } => {
            set_total(&bar, files);
            bar.set_message(format!("{} input files", HumanCount(files as u64)));
        }
        RdfProgress::FileDone {
            file,
            lines,
            skipped,
        } => {
            bar.inc(1);
            if skipped > 0 {
                bar.println(format!("{}: {} unreadable lines skipped", file_name(&file), skipped));
            }
            bar.set_message(format!("{} ({} lines)", file_name(&file), HumanCount(lines as u64)));
        }
        RdfProgress::Flushed { operations } => {
            bar.set_message(format!("{} pushed", HumanCount(operations as u64)));
        }
        RdfProgress::Finished { files, records } => {
            bar.finish_with_message(format!(
                "{} files, {} records in {:.0?}",
                HumanCount(files as u64),
                HumanCount(records as u64),
                bar.elapsed()
            ));
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn glob(
    mut config: Config,
    input: &Path,
    dest: &Path,
    service: &str,
    meta: Option<PathBuf>,
    omid_map: Option<PathBuf>,
    emission: Emission,
    color: ColorMode,
) -> anyhow::Result<()> {
    let tag = service.to_lowercase();
    match config.services.get_mut(&tag) {
        Some(section) => section.cache_dir = dest.to_path_buf(),
        None => return Err(unknown_service(&config, service)),
    }

    let meta: Option<Arc<dyn DataSource>> = match meta {
        Some(dir) => {
            let source = CsvDataSource::open(&dir)
                .with_context(|| format!("cannot open Meta data map {}", dir.display()))?;
            tracing::info!(path = %dir.display(), ids = source.len(), "loaded Meta data map");
            Some(Arc::new(source))
        }
        None => None,
    };

    let omids = match omid_map {
        Some(path) => Some(Arc::new(
            OmidMap::load(&path).with_context(|| format!("cannot load OMID map {}", path.display()))?,
        )),
        None => None,
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let multi = MultiProgress::new();
    let parse_bar = multi.add(spinner("Discovering input files..."));
    let resolve_bar = multi.add(spinner("Waiting for parsed tuples..."));

    let mut builder = GlobBuilder::for_service(&tag, &config, meta)?
        .with_cancel(cancel)
        .with_progress({
            let parse_bar = parse_bar.clone();
            let resolve_bar = resolve_bar.clone();
            move |event| match event {
                GlobProgress::Discovered { files } => {
                    set_total(&parse_bar, files);
                    parse_bar.set_message("Parsing");
                }
                GlobProgress::FileParsed { file, tuples } => {
                    parse_bar.inc(1);
                    parse_bar.set_message(format!(
                        "{} ({} tuples)",
                        file_name(&file),
                        HumanCount(tuples as u64)
                    ));
                }
                GlobProgress::FileSkipped { file, reason } => {
                    parse_bar.inc(1);
                    parse_bar.println(format!("Skipped {}: {}", file_name(&file), reason));
                }
                GlobProgress::Resolving {
                    identifiers,
                    cached,
                } => {
                    if !parse_bar.is_finished() {
                        parse_bar.finish_with_message(format!("Parsed in {:.0?}", parse_bar.elapsed()));
                    }
                    set_total(&resolve_bar, identifiers.saturating_sub(cached));
                    resolve_bar.set_message(format!(
                        "Resolving ({} already cached)",
                        HumanCount(cached as u64)
                    ));
                }
                GlobProgress::Resolved { done, total } => {
                    resolve_bar.set_length(total as u64);
                    resolve_bar.set_position(done as u64);
                }
                GlobProgress::Flushed => {
                    resolve_bar.set_message("Cache flushed");
                }
            }
        });
    if let Some(omids) = omids {
        builder = builder.with_omid_map(omids);
    }

    let kind = builder.kind();
    let GlobOutput { tuples, report } = match builder.run(input).await {
        Ok(out) => out,
        Err(IngestError::Cancelled) => {
            resolve_bar.abandon_with_message("Cancelled; resolved identifiers were kept");
            anyhow::bail!("glob cancelled");
        }
        Err(e) => return Err(e.into()),
    };
    resolve_bar.finish_with_message(format!(
        "Resolved {} identifiers in {:.0?}",
        HumanCount(report.resolved as u64),
        resolve_bar.elapsed()
    ));

    let cache = Arc::clone(builder.cache());
    let scheme = kind.scheme();
    let (emitted, stored_in) = match emission {
        Emission::None => (None, None),
        Emission::Table => {
            let dest = dest.to_path_buf();
            let report = tokio::task::spawn_blocking(move || {
                ocindex_ingest::emit_citations(&tuples, scheme, cache.as_ref(), &dest)
            })
            .await??;
            (Some(report), None)
        }
        Emission::Store { dir, agent, source } => {
            let (_, prefix) = service_oci(&config, &tag)?;
            let lookup = config.data_dir.join(LOOKUP_FILE);
            let settings = StorerSettings::new(
                format!("OpenCitations Index: {}", tag.to_uppercase()),
                agent,
                source,
            );
            let store_dir = dir.clone();
            let report = tokio::task::spawn_blocking(move || {
                store_glob(&tuples, scheme, prefix, cache.as_ref(), &lookup, &store_dir, settings)
            })
            .await??;
            (Some(report), Some(dir))
        }
    };

    let mut stdout = std::io::stdout().lock();
    output::print_glob_summary(
        &mut stdout,
        &tag,
        dest,
        &report,
        emitted.as_ref(),
        stored_in.as_deref(),
        color,
    )?;
    stdout.flush()?;
    Ok(())
}

async fn validate(
    config: &Config,
    input: PathBuf,
    output: PathBuf,
    service: &str,
    index: Option<PathBuf>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let tag = service.to_lowercase();
    let (scheme, prefix) = service_oci(config, &tag)?;
    let lookup = config.data_dir.join(LOOKUP_FILE);
    let bar = spinner(&format!("Validating {} citations...", tag.to_uppercase()));
    let out_dir = output.clone();
    let report = tokio::task::spawn_blocking(move || {
        let known = match &index {
            Some(index) => ocindex_ingest::known_ocis(index)?,
            None => HashSet::new(),
        };
        let mut minter = OciMinter::new(scheme, prefix, OciLookup::load(&lookup)?);
        let report = ocindex_ingest::validate_against(&input, &known, &mut minter, &out_dir)?;
        minter.lookup_mut().save(&lookup)?;
        Ok::<_, IngestError>(report)
    })
    .await??;
    bar.finish_and_clear();

    let mut stdout = std::io::stdout().lock();
    output::print_validate_summary(&mut stdout, &tag, &report, &output, color)?;
    Ok(())
}

async fn rdf2csv(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let bar = spinner("Looking for zipped dumps...");
    let progress = rdf_progress(bar.clone());
    let written = tokio::task::spawn_blocking(move || ocindex_rdf::rdf2csv(&input, &output, progress))
        .await??;
    if written.is_empty() {
        bar.finish_with_message("No .zip dumps found");
    }
    for path in &written {
        println!("{}", path.display());
    }
    Ok(())
}

async fn citation_count(
    input: PathBuf,
    input_type: InputType,
    output: PathBuf,
    top: usize,
    color: ColorMode,
) -> anyhow::Result<()> {
    let bar = spinner("Looking for inputs...");
    let progress = rdf_progress(bar);
    let out_dir = output.clone();
    let counts = tokio::task::spawn_blocking(move || {
        ocindex_rdf::citation_count(&input, input_type, &out_dir, progress)
    })
    .await??;

    let mut stdout = std::io::stdout().lock();
    output::print_count_summary(
        &mut stdout,
        &counts,
        &output.join(ocindex_rdf::count::COUNT_FILE),
        top,
        color,
    )?;
    Ok(())
}

async fn global_index(
    config: &Config,
    input: PathBuf,
    batch_size: Option<usize>,
    dry_run: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    let batch_size = batch_size.unwrap_or(config.redis.batch_size).max(1);
    let url = config.redis.url();
    let bar = spinner("Looking for triple files...");
    let progress = rdf_progress(bar);

    let (report, target) = if dry_run {
        tokio::task::spawn_blocking(move || {
            let mut store = MemoryListStore::default();
            let report = ocindex_rdf::push_global_index(&input, &mut store, batch_size, progress)?;
            let target = format!("memory ({} lists, not persisted)", store.lists.len());
            Ok::<_, ocindex_rdf::RdfError>((report, target))
        })
        .await??
    } else {
        let target = format!("{}:{} db {}", config.redis.host, config.redis.port, config.redis.db);
        let report = tokio::task::spawn_blocking(move || {
            let mut store = RedisListStore::open(&url)?;
            ocindex_rdf::push_global_index(&input, &mut store, batch_size, progress)
        })
        .await??;
        (report, target)
    };

    let mut stdout = std::io::stdout().lock();
    output::print_push_summary(&mut stdout, &report, &target, color)?;
    Ok(())
}

async fn edit_rdf(
    input: PathBuf,
    output: PathBuf,
    mode: EditMode,
    color: ColorMode,
) -> anyhow::Result<()> {
    let bar = spinner("Looking for triple files...");
    let progress = rdf_progress(bar);
    let out_dir = output.clone();
    let report =
        tokio::task::spawn_blocking(move || ocindex_rdf::edit_dir(&input, &out_dir, &mode, progress))
            .await??;

    let mut stdout = std::io::stdout().lock();
    output::print_edit_summary(&mut stdout, &report, &output, color)?;
    Ok(())
}

async fn check_metadata(input: PathBuf, field: String, color: ColorMode) -> anyhow::Result<()> {
    let path = ocindex_ingest::parse_field_path(&field);
    if path.is_empty() {
        anyhow::bail!("empty metadata field: {:?}", field);
    }
    let bar = spinner(&format!("Scanning {} for {}...", input.display(), field));
    let best = tokio::task::spawn_blocking(move || ocindex_ingest::check_metadata(&input, &path))
        .await??;
    bar.finish_and_clear();

    let mut stdout = std::io::stdout().lock();
    output::print_metadata(&mut stdout, &field, best.as_ref(), color)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── argument parsing ──────────────────────────────────────────────

    #[test]
    fn glob_arguments_parse() {
        let cli = Cli::parse_from(["ocindex", "glob", "-i", "dump", "-o", "out", "-s", "DOCI"]);
        match cli.command {
            Command::Glob {
                input,
                output,
                service,
                meta,
                no_emit,
                store,
                omid_map,
                agent,
                source,
            } => {
                assert_eq!(input, PathBuf::from("dump"));
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(service, "DOCI");
                assert!(meta.is_none());
                assert!(!no_emit);
                assert!(store.is_none() && omid_map.is_none() && source.is_none());
                assert_eq!(agent, DEFAULT_AGENT);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn store_and_validate_arguments_parse() {
        let cli = Cli::parse_from([
            "ocindex", "glob", "-i", "dump", "-o", "out", "-s", "oroci", "--store", "index",
            "--omid-map", "map.zip",
        ]);
        assert!(matches!(
            cli.command,
            Command::Glob { store: Some(ref dir), omid_map: Some(_), .. } if dir == Path::new("index")
        ));

        let cli = Cli::parse_from(["ocindex", "validate", "-i", "in", "-o", "out", "--index", "ci"]);
        match cli.command {
            Command::Validate { service, index, .. } => {
                assert_eq!(service, "coci");
                assert_eq!(index, Some(PathBuf::from("ci")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    // ── services ──────────────────────────────────────────────────────

    #[test]
    fn service_oci_uses_parser_scheme_and_prefix() {
        let config = Config::default();
        let (scheme, prefix) = service_oci(&config, "coci").unwrap();
        assert_eq!((scheme, prefix.as_str()), (Scheme::Doi, "020"));
        let (scheme, prefix) = service_oci(&config, "oroci").unwrap();
        assert_eq!((scheme, prefix.as_str()), (Scheme::Omid, ""));

        let err = service_oci(&config, "nope").unwrap_err().to_string();
        assert!(err.contains("unknown service: nope"));
        assert!(err.contains("coci"));
    }

    #[test]
    fn stored_globs_skip_ocis_already_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ocindex_core::MemoryDataSource::new();
        for id in ["omid:br/061", "omid:br/062"] {
            cache.set(id, ocindex_core::ResolutionRecord::valid()).unwrap();
        }
        let tuples = vec![CitationData::new("omid:br/061", "omid:br/062")];
        let lookup = dir.path().join(LOOKUP_FILE);
        let store = dir.path().join("index");
        let settings = || StorerSettings::new("OpenCitations Index: OROCI", DEFAULT_AGENT, "dump");

        let first =
            store_glob(&tuples, Scheme::Omid, String::new(), &cache, &lookup, &store, settings())
                .unwrap();
        assert_eq!(first.written, 1);
        let again =
            store_glob(&tuples, Scheme::Omid, String::new(), &cache, &lookup, &store, settings())
                .unwrap();
        assert_eq!((again.written, again.duplicates), (0, 1));
    }

    #[test]
    fn legacy_count_name_is_accepted() {
        let cli = Cli::parse_from(["ocindex", "citationcount_dump_gen", "-i", "in", "-t", "csv"]);
        match cli.command {
            Command::CitationCount {
                input_type, output, ..
            } => {
                assert_eq!(input_type, InputType::Csv);
                assert_eq!(output, PathBuf::from("."));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn bad_input_type_is_rejected() {
        assert!(Cli::try_parse_from(["ocindex", "citation-count", "-i", "in", "-t", "json"]).is_err());
    }

    #[test]
    fn edit_mode_and_metadata_field_parse() {
        let cli = Cli::parse_from(["ocindex", "edit-rdf", "-i", "a", "-o", "b", "-m", "coci"]);
        assert!(matches!(
            cli.command,
            Command::EditRdf { mode: EditMode::Service(ref tag), .. } if tag == "coci"
        ));

        let cli = Cli::parse_from(["ocindex", "--no-color", "check-metadata", "-i", "a", "-m", "issued=>date-parts"]);
        assert!(cli.no_color);
        assert!(matches!(cli.command, Command::CheckMetadata { ref field, .. } if field == "issued=>date-parts"));
    }

    // ── config ────────────────────────────────────────────────────────

    #[test]
    fn explicit_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[redis]\nhost = \"cache.local\"\nbatch_size = 10\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.redis.host, "cache.local");
        assert_eq!(config.redis.batch_size, 10);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn progress_file_names_are_shortened() {
        assert_eq!(file_name("/data/dump/part-1.json"), "part-1.json");
        assert_eq!(file_name("dump.tar.gz:part-1.json"), "dump.tar.gz:part-1.json");
    }
}
