//! The glob builder: parse a dump, resolve every identifier it mentions and
//! record the outcome in the service's resolution cache.
//!
//! A run goes through four phases:
//!
//! 1. **Discover**: enumerate the input members ([`get_all_files`]).
//! 2. **Parse**: a pool of `parse_workers` tasks parses one member each on
//!    the blocking pool; tar.gz inputs are streamed in a single pass.
//! 3. **Resolve**: every distinct identifier without a concrete validity in
//!    the cache goes through the [`FinderChain`] on a pool of
//!    `resolve_workers` tasks, and the record is merged into the cache.
//! 4. **Finalise**: dates carried by the tuples are added to the records of
//!    valid identifiers, then the cache is flushed.
//!
//! The cache is flushed only at the end of a run (or when a cancelled run
//! stops), never in the middle of a phase. Cache calls are synchronous
//! (network round trips, the tabular writer lock) and always run on the
//! blocking pool.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ocindex_core::finder::FinderChain;
use ocindex_core::identifier::{self, ValidityMemo};
use ocindex_core::{
    ApiClient, CacheError, CitationData, Config, CoreError, DataSource, ResolutionRecord,
    build_data_source,
};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::IngestError;
use crate::parser::{OmidMap, ParserKind, parser_with_map};
use crate::preprocess::{Member, TarHandle, get_all_files, read_member};

/// Identifiers looked up per `mget` round trip.
const LOOKUP_CHUNK: usize = 1_000;

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum GlobProgress {
    Discovered { files: usize },
    FileParsed { file: String, tuples: usize },
    FileSkipped { file: String, reason: String },
    Resolving { identifiers: usize, cached: usize },
    Resolved { done: usize, total: usize },
    Flushed,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobReport {
    pub files: usize,
    pub skipped_files: usize,
    pub tuples: usize,
    /// Distinct identifiers mentioned by the tuples.
    pub identifiers: usize,
    /// Identifiers sent through the finder chain.
    pub resolved: usize,
    /// Identifiers the cache already had a decision for.
    pub cache_hits: usize,
    /// Identifiers valid at the end of the run.
    pub valid: usize,
}

/// The tuples a run parsed, in file order, plus its counters.
#[derive(Debug)]
pub struct GlobOutput {
    pub tuples: Vec<CitationData>,
    pub report: GlobReport,
}

type ProgressFn = Arc<dyn Fn(GlobProgress) + Send + Sync>;

/// One parsed input member.
struct ParsedMember {
    index: usize,
    member: Member,
    outcome: Result<Vec<CitationData>, IngestError>,
}

pub struct GlobBuilder {
    kind: ParserKind,
    chain: Arc<FinderChain>,
    cache: Arc<dyn DataSource>,
    omids: Option<Arc<OmidMap>>,
    parse_workers: usize,
    resolve_workers: usize,
    cancel: CancellationToken,
    progress: ProgressFn,
}

fn join_error(e: JoinError) -> IngestError {
    IngestError::Io(std::io::Error::other(e))
}

/// Run one cache call on the blocking pool.
async fn cache_call<T: Send + 'static>(
    cache: &Arc<dyn DataSource>,
    call: impl FnOnce(&dyn DataSource) -> Result<T, CacheError> + Send + 'static,
) -> Result<T, IngestError> {
    let cache = Arc::clone(cache);
    tokio::task::spawn_blocking(move || call(cache.as_ref()))
        .await
        .map_err(join_error)?
        .map_err(IngestError::from)
}

fn parse_member(
    kind: ParserKind,
    omids: Option<&Arc<OmidMap>>,
    bytes: &[u8],
) -> Result<Vec<CitationData>, IngestError> {
    let mut parser = parser_with_map(kind, omids);
    parser.parse_bytes(bytes)?;
    Ok(parser.collect_all())
}

impl GlobBuilder {
    pub fn new(kind: ParserKind, chain: Arc<FinderChain>, cache: Arc<dyn DataSource>) -> Self {
        Self {
            kind,
            chain,
            cache,
            omids: None,
            parse_workers: 1,
            resolve_workers: 1,
            cancel: CancellationToken::new(),
            progress: Arc::new(|_| {}),
        }
    }

    /// Wire up the builder for a configured service.
    ///
    /// Opens the service's cache, builds the HTTP client (unless
    /// `use_api_service` is off) and the finder chain its config names.
    /// `meta` is the OpenCitations Meta data map required by `ocmeta`.
    pub fn for_service(
        tag: &str,
        config: &Config,
        meta: Option<Arc<dyn DataSource>>,
    ) -> Result<Self, IngestError> {
        let service = config
            .service(tag)
            .ok_or_else(|| IngestError::UnknownService(tag.to_string()))?;
        let kind: ParserKind = service.parser.parse().map_err(CoreError::Config)?;
        let cache = build_data_source(service, &config.redis)?;

        let api = if config.use_api_service {
            Some(Arc::new(ApiClient::new(config).map_err(CoreError::from)?))
        } else {
            None
        };
        let chain = FinderChain::from_names(
            kind.scheme(),
            &service.finders,
            api.as_ref(),
            config,
            meta.as_ref(),
            ValidityMemo::new(&cache),
        )?;
        tracing::info!(
            service = tag,
            parser = %kind,
            finders = ?chain.finder_names(),
            "glob builder ready"
        );

        Ok(Self::new(kind, Arc::new(chain), cache)
            .with_workers(config.parse_workers, config.resolve_workers))
    }

    pub fn with_workers(mut self, parse_workers: usize, resolve_workers: usize) -> Self {
        self.parse_workers = parse_workers.max(1);
        self.resolve_workers = resolve_workers.max(1);
        self
    }

    /// The identifier to OMID map the OpenAIRE parser keys citations with.
    pub fn with_omid_map(mut self, omids: Arc<OmidMap>) -> Self {
        self.omids = Some(omids);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(GlobProgress) + Send + Sync + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn kind(&self) -> ParserKind {
        self.kind
    }

    pub fn cache(&self) -> &Arc<dyn DataSource> {
        &self.cache
    }

    /// Run the whole pipeline over `input`.
    pub async fn run(&self, input: &Path) -> Result<GlobOutput, IngestError> {
        let mut report = GlobReport::default();
        let ext = self.kind.extension();
        let path = input.to_path_buf();
        let (members, handle) = tokio::task::spawn_blocking(move || get_all_files(&path, ext))
            .await
            .map_err(join_error)??;

        report.files = members.len();
        tracing::info!(input = %input.display(), files = members.len(), parser = %self.kind, "discovered input files");
        (self.progress)(GlobProgress::Discovered {
            files: members.len(),
        });

        let parsed = self.parse_all(members, handle).await?;
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let mut tuples = Vec::new();
        for file in parsed {
            match file.outcome {
                Ok(found) => tuples.extend(found),
                Err(e) => {
                    tracing::warn!(member = %file.member, index = file.index, error = %e, "skipping input file");
                    report.skipped_files += 1;
                }
            }
        }
        report.tuples = tuples.len();

        let scheme = self.kind.scheme();
        let mut ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut dates: HashMap<String, BTreeSet<String>> = HashMap::new();
        for tuple in &tuples {
            let sides = [
                (&tuple.citing, &tuple.citing_date),
                (&tuple.cited, &tuple.cited_date),
            ];
            for (raw, date) in sides {
                let Some(id) = identifier::normalise(scheme, raw, true) else {
                    tracing::debug!(id = %raw, "dropping unparseable identifier");
                    continue;
                };
                if let Some(date) = date {
                    dates.entry(id.clone()).or_default().insert(date.clone());
                }
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        report.identifiers = ids.len();

        let mut pending = Vec::new();
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let keys = chunk.to_vec();
            let stored = cache_call(&self.cache, move |cache| cache.mget(&keys)).await?;
            for (id, record) in chunk.iter().zip(stored) {
                if record.is_some_and(|r| r.valid.is_known()) {
                    tracing::trace!(id = %id, "cache hit");
                    report.cache_hits += 1;
                } else {
                    tracing::trace!(id = %id, "cache miss");
                    pending.push(id.clone());
                }
            }
        }
        (self.progress)(GlobProgress::Resolving {
            identifiers: ids.len(),
            cached: report.cache_hits,
        });

        let resolved = self.resolve_all(pending).await;
        // checkpoint whatever was resolved, even if the run stops here
        cache_call(&self.cache, |cache| cache.flush()).await?;
        report.resolved = resolved?;
        if self.cancel.is_cancelled() {
            (self.progress)(GlobProgress::Flushed);
            return Err(IngestError::Cancelled);
        }

        let mut facts = Vec::new();
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let keys = chunk.to_vec();
            let stored = cache_call(&self.cache, move |cache| cache.mget(&keys)).await?;
            for (id, record) in chunk.iter().zip(stored) {
                if !record.is_some_and(|r| r.is_valid()) {
                    continue;
                }
                report.valid += 1;
                if let Some(date) = dates.remove(id) {
                    facts.push((
                        id.clone(),
                        ResolutionRecord {
                            date,
                            ..Default::default()
                        },
                    ));
                }
            }
        }
        if !facts.is_empty() {
            tracing::debug!(ids = facts.len(), "merging tuple dates");
            cache_call(&self.cache, move |cache| cache.mset(facts)).await?;
        }
        cache_call(&self.cache, |cache| cache.flush()).await?;
        (self.progress)(GlobProgress::Flushed);

        tracing::info!(
            files = report.files,
            skipped = report.skipped_files,
            tuples = report.tuples,
            identifiers = report.identifiers,
            resolved = report.resolved,
            cache_hits = report.cache_hits,
            valid = report.valid,
            "glob run finished"
        );
        Ok(GlobOutput { tuples, report })
    }

    /// Parse every member on the worker pool; results come back in input order.
    async fn parse_all(
        &self,
        members: Vec<Member>,
        handle: Option<TarHandle>,
    ) -> Result<Vec<ParsedMember>, IngestError> {
        let (tx, rx) = async_channel::bounded::<(usize, Member, Result<Vec<u8>, IngestError>)>(
            self.parse_workers * 2,
        );
        let ext = self.kind.extension();
        let cancel = self.cancel.clone();

        let producer = tokio::task::spawn_blocking(move || -> Result<(), IngestError> {
            match handle {
                Some(handle) => {
                    let mut index = 0;
                    handle.for_each(ext, |member, bytes| {
                        let sent = !cancel.is_cancelled()
                            && tx.send_blocking((index, member, Ok(bytes))).is_ok();
                        index += 1;
                        sent
                    })
                }
                None => {
                    for (index, member) in members.into_iter().enumerate() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let bytes = read_member(&member, None);
                        if tx.send_blocking((index, member, bytes)).is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
            }
        });

        let mut workers = Vec::with_capacity(self.parse_workers);
        for _ in 0..self.parse_workers {
            let rx = rx.clone();
            let kind = self.kind;
            let omids = self.omids.clone();
            let progress = self.progress.clone();
            workers.push(tokio::spawn(async move {
                let mut done = Vec::new();
                while let Ok((index, member, bytes)) = rx.recv().await {
                    let outcome = match bytes {
                        Ok(bytes) => {
                            let omids = omids.clone();
                            tokio::task::spawn_blocking(move || {
                                parse_member(kind, omids.as_ref(), &bytes)
                            })
                            .await
                            .unwrap_or_else(|e| Err(join_error(e)))
                        }
                        Err(e) => Err(e),
                    };
                    match &outcome {
                        Ok(tuples) => {
                            tracing::debug!(member = %member, tuples = tuples.len(), "parsed input file");
                            progress(GlobProgress::FileParsed {
                                file: member.file_name(),
                                tuples: tuples.len(),
                            });
                        }
                        Err(e) => progress(GlobProgress::FileSkipped {
                            file: member.file_name(),
                            reason: e.to_string(),
                        }),
                    }
                    done.push(ParsedMember {
                        index,
                        member,
                        outcome,
                    });
                }
                done
            }));
        }
        // workers hold the only receivers now
        drop(rx);

        let produced = producer.await.map_err(join_error)?;
        let mut parsed = Vec::new();
        for worker in workers {
            parsed.extend(worker.await.map_err(join_error)?);
        }
        produced?;

        parsed.sort_by_key(|p| p.index);
        Ok(parsed)
    }

    /// Resolve `ids` on the worker pool; returns how many were stored.
    async fn resolve_all(&self, ids: Vec<String>) -> Result<usize, IngestError> {
        let total = ids.len();
        if total == 0 {
            return Ok(0);
        }
        let (tx, rx) = async_channel::bounded::<String>(self.resolve_workers * 4);
        let done = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(self.resolve_workers);
        for _ in 0..self.resolve_workers {
            let rx = rx.clone();
            let chain = self.chain.clone();
            let cache = self.cache.clone();
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();
            let done = done.clone();
            workers.push(tokio::spawn(async move {
                while let Ok(id) = rx.recv().await {
                    let fetched = tokio::select! {
                        _ = cancel.cancelled() => break,
                        fetched = chain.fetch(&id) => fetched,
                    };
                    let record = match fetched {
                        Ok(record) => record,
                        Err(e @ (CoreError::Cache(_) | CoreError::Config(_))) => {
                            return Err(IngestError::from(e));
                        }
                        Err(e) => {
                            tracing::warn!(id = %id, error = %e, "resolution failed, caching as invalid");
                            ResolutionRecord::invalid()
                        }
                    };
                    cache_call(&cache, move |cache| cache.set(&id, record)).await?;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    progress(GlobProgress::Resolved { done: n, total });
                }
                Ok::<(), IngestError>(())
            }));
        }
        drop(rx);

        for id in ids {
            if self.cancel.is_cancelled() || tx.send(id).await.is_err() {
                break;
            }
        }
        tx.close();

        let mut failure = None;
        for worker in workers {
            if let Err(e) = worker.await.map_err(join_error)? {
                tracing::error!(error = %e, "resolution worker stopped");
                failure.get_or_insert(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(done.load(Ordering::Relaxed)),
        }
    }
}
