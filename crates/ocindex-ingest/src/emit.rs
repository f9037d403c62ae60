//! Enriched citation output.
//!
//! After a glob run every tuple whose two sides are valid is completed from
//! the cache (missing dates, journal and author self-citation flags). The
//! rows are then written once to `citations.csv`, or keyed by their OCI and
//! stored as CSV, RDF and Scholix with provenance.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Months, NaiveDate, NaiveDateTime};
use ocindex_core::finder::{get_date, share_issn, share_orcid};
use ocindex_core::identifier;
use ocindex_core::{CitationData, DataSource, ResolutionRecord, Scheme, check_date};
use serde_json::{Value, json};

use crate::IngestError;
use crate::oci::OciMinter;

pub const CITATIONS_FILE: &str = "citations.csv";
pub const HEADER: [&str; 6] = [
    "citing",
    "cited",
    "citing_date",
    "cited_date",
    "journal_sc",
    "author_sc",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub written: usize,
    pub duplicates: usize,
    /// Tuples dropped because one side is not valid.
    pub invalid: usize,
}

fn flag(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "",
    }
}

/// Writes citation rows, skipping repeats of a `(citing, cited)` pair.
pub struct CitationWriter<W: Write> {
    writer: csv::Writer<W>,
    seen: HashSet<(String, String)>,
    report: EmitReport,
}

impl CitationWriter<File> {
    pub fn create(path: &Path) -> Result<Self, IngestError> {
        Self::from_writer(File::create(path)?)
    }
}

impl<W: Write> CitationWriter<W> {
    pub fn from_writer(inner: W) -> Result<Self, IngestError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(HEADER)?;
        Ok(Self {
            writer,
            seen: HashSet::new(),
            report: EmitReport::default(),
        })
    }

    /// Write `citation`; returns `false` if the pair was already written.
    pub fn write(&mut self, citation: &CitationData) -> Result<bool, IngestError> {
        if !self
            .seen
            .insert((citation.citing.clone(), citation.cited.clone()))
        {
            self.report.duplicates += 1;
            return Ok(false);
        }
        self.writer.write_record([
            citation.citing.as_str(),
            citation.cited.as_str(),
            citation.citing_date.as_deref().unwrap_or(""),
            citation.cited_date.as_deref().unwrap_or(""),
            flag(citation.journal_self_citation),
            flag(citation.author_self_citation),
        ])?;
        self.report.written += 1;
        Ok(true)
    }

    pub fn skip_invalid(&mut self) {
        self.report.invalid += 1;
    }

    pub fn finish(mut self) -> Result<EmitReport, IngestError> {
        self.writer.flush()?;
        Ok(self.report)
    }
}

/// Fill the gaps of `tuple` from the two resolved records.
///
/// Dates already carried by the tuple win over cached ones.
pub fn enrich(tuple: &CitationData, citing: &ResolutionRecord, cited: &ResolutionRecord) -> CitationData {
    let mut out = tuple.clone();
    out.citing_date = out.citing_date.or_else(|| get_date([citing]));
    out.cited_date = out.cited_date.or_else(|| get_date([cited]));
    out.journal_self_citation = out.journal_self_citation.or(share_issn(citing, cited));
    out.author_self_citation = out.author_self_citation.or(share_orcid(citing, cited));
    out
}

/// Where resolved citations go.
pub trait CitationSink {
    /// Take one enriched row with prefixed identifiers; `false` if it was
    /// dropped as a repeat.
    fn write(&mut self, row: &CitationData) -> Result<bool, IngestError>;

    /// Count a tuple dropped because one side is not valid.
    fn skip_invalid(&mut self);
}

impl<W: Write> CitationSink for CitationWriter<W> {
    fn write(&mut self, row: &CitationData) -> Result<bool, IngestError> {
        CitationWriter::write(self, row)
    }

    fn skip_invalid(&mut self) {
        CitationWriter::skip_invalid(self)
    }
}

/// Enrich every tuple whose two sides are valid in `cache` and hand it to
/// `sink` with identifiers in prefixed form.
pub fn emit_into(
    tuples: &[CitationData],
    scheme: Scheme,
    cache: &dyn DataSource,
    sink: &mut dyn CitationSink,
) -> Result<(), IngestError> {
    let mut records: HashMap<String, Option<ResolutionRecord>> = HashMap::new();

    for tuple in tuples {
        let (Some(citing), Some(cited)) = (
            identifier::normalise(scheme, &tuple.citing, true),
            identifier::normalise(scheme, &tuple.cited, true),
        ) else {
            sink.skip_invalid();
            continue;
        };
        for id in [&citing, &cited] {
            if !records.contains_key(id) {
                records.insert(id.clone(), cache.get(id)?);
            }
        }
        let (Some(Some(citing_record)), Some(Some(cited_record))) =
            (records.get(&citing), records.get(&cited))
        else {
            sink.skip_invalid();
            continue;
        };
        if !citing_record.is_valid() || !cited_record.is_valid() {
            tracing::trace!(citing = %citing, cited = %cited, "dropping citation with an invalid side");
            sink.skip_invalid();
            continue;
        }

        let mut row = enrich(tuple, citing_record, cited_record);
        row.citing = citing;
        row.cited = cited;
        sink.write(&row)?;
    }
    Ok(())
}

/// Enrich `tuples` from `cache` and write `citations.csv` under `dest`.
///
/// Identifiers are written in prefixed form.
pub fn emit_citations(
    tuples: &[CitationData],
    scheme: Scheme,
    cache: &dyn DataSource,
    dest: &Path,
) -> Result<EmitReport, IngestError> {
    std::fs::create_dir_all(dest)?;
    let path = dest.join(CITATIONS_FILE);
    let mut writer = CitationWriter::create(&path)?;
    emit_into(tuples, scheme, cache, &mut writer)?;

    let report = writer.finish()?;
    tracing::info!(
        path = %path.display(),
        written = report.written,
        duplicates = report.duplicates,
        invalid = report.invalid,
        "wrote citations"
    );
    Ok(report)
}

// ── OCI-keyed citations ────────────────────────────────────────────────

pub const INDEX_BASE: &str = "https://w3id.org/oc/index/";
pub const DATA_HEADER: [&str; 7] = [
    "oci",
    "citing",
    "cited",
    "creation",
    "timespan",
    "journal_sc",
    "author_sc",
];
pub const PROV_HEADER: [&str; 8] = [
    "oci",
    "snapshot",
    "agent",
    "source",
    "created",
    "invalidated",
    "description",
    "update",
];

const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const CITO: &str = "http://purl.org/spar/cito/";
const PROV: &str = "http://www.w3.org/ns/prov#";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
const DESCRIPTION: &str = "http://purl.org/dc/terms/description";
const CREATION_NOTE: &str = "Creation of the citation";
const CC0: &str = "https://creativecommons.org/publicdomain/zero/1.0/legalcode";

/// Parse an ISO date fragment, completing a missing month or day with 1.
/// February 29th of a common year becomes the 28th.
fn parse_fragment(date: &str) -> Option<NaiveDate> {
    let mut parts = date.split('-').map(str::parse::<u32>);
    let year = i32::try_from(parts.next()?.ok()?).ok()?;
    let month = parts.next().transpose().ok()?.unwrap_or(1);
    let day = parts.next().transpose().ok()?.unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| NaiveDate::from_ymd_opt(year, month, 28))
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let n = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(n)
    } else {
        date.checked_sub_months(n)
    }
}

/// Calendar difference `later - earlier` as signed (years, months, days),
/// all carrying the same sign. Month arithmetic clamps to the month end.
fn calendar_delta(later: NaiveDate, earlier: NaiveDate) -> Option<(i64, i64, i64)> {
    let mut months = i64::from(later.year() - earlier.year()) * 12
        + i64::from(later.month()) - i64::from(earlier.month());
    let mut anchor = shift_months(earlier, months)?;
    if later < earlier {
        while later > anchor {
            months += 1;
            anchor = shift_months(earlier, months)?;
        }
    } else {
        while later < anchor {
            months -= 1;
            anchor = shift_months(earlier, months)?;
        }
    }
    let days = (later - anchor).num_days();
    Some((months / 12, months % 12, days))
}

/// The citation time span between two publication dates as an ISO 8601
/// duration (`P1Y2M3D`, negative when the cited work is younger).
///
/// Months and days appear only when both dates carry them; a side missing
/// them borrows them from the other before the difference is taken.
pub fn timespan(citing_date: &str, cited_date: &str) -> Option<String> {
    let citing = check_date(citing_date)?;
    let cited = check_date(cited_date)?;
    let with_months = citing.len() >= 7 && cited.len() >= 7;
    let with_days = citing.len() >= 10 && cited.len() >= 10;

    let mut citing_full = citing.clone();
    let mut cited_full = cited.clone();
    if citing.len() >= 7 && cited.len() < 7 {
        cited_full.push_str(&citing[4..7]);
    } else if citing.len() < 7 && cited.len() >= 7 {
        citing_full.push_str(&cited[4..7]);
    }
    if citing.len() >= 10 && cited.len() < 10 {
        cited_full.push_str(&citing[7..]);
    } else if citing.len() < 10 && cited.len() >= 10 {
        citing_full.push_str(&cited[7..]);
    }

    let (years, months, days) =
        calendar_delta(parse_fragment(&citing_full)?, parse_fragment(&cited_full)?)?;
    let negative = years < 0
        || (years == 0 && months < 0 && with_months)
        || (years == 0 && months == 0 && days < 0 && with_days);

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&format!("P{}Y", years.abs()));
    if with_months {
        out.push_str(&format!("{}M", months.abs()));
    }
    if with_days {
        out.push_str(&format!("{}D", days.abs()));
    }
    Some(out)
}

/// A citation keyed by its OCI, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub oci: String,
    /// Prefixed identifiers.
    pub citing: String,
    pub cited: String,
    pub citing_date: Option<String>,
    pub cited_date: Option<String>,
    /// The citing entity's publication date.
    pub creation: Option<String>,
    pub timespan: Option<String>,
    pub journal_sc: bool,
    pub author_sc: bool,
}

impl Citation {
    /// Build from an enriched row; unknown self-citation flags count as `no`.
    pub fn new(oci: impl Into<String>, row: &CitationData) -> Self {
        let citing_date = row.citing_date.as_deref().and_then(check_date);
        let cited_date = row.cited_date.as_deref().and_then(check_date);
        let timespan = match (&citing_date, &cited_date) {
            (Some(citing), Some(cited)) => timespan(citing, cited),
            _ => None,
        };
        Self {
            oci: oci.into(),
            citing: row.citing.clone(),
            cited: row.cited.clone(),
            creation: citing_date.clone(),
            citing_date,
            cited_date,
            timespan,
            journal_sc: row.journal_self_citation.unwrap_or(false),
            author_sc: row.author_self_citation.unwrap_or(false),
        }
    }

    pub fn data_record(&self) -> [String; 7] {
        let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
        [
            self.oci.clone(),
            self.citing.clone(),
            self.cited.clone(),
            self.creation.clone().unwrap_or_default(),
            self.timespan.clone().unwrap_or_default(),
            yes_no(self.journal_sc),
            yes_no(self.author_sc),
        ]
    }

    pub fn prov_record(&self, agent: &str, source: &str, created: &str) -> [String; 8] {
        [
            self.oci.clone(),
            "1".into(),
            agent.into(),
            source.into(),
            created.into(),
            String::new(),
            CREATION_NOTE.into(),
            String::new(),
        ]
    }

    fn iri(&self, base: &str) -> String {
        format!("<{}ci/{}>", base, self.oci)
    }

    /// Data triples in N-Triples.
    pub fn to_ntriples(&self, base: &str) -> String {
        let ci = self.iri(base);
        let mut out = String::new();
        let mut triple = |p: String, o: String| out.push_str(&format!("{} {} {} .\n", ci, p, o));
        triple(format!("<{RDF}type>"), format!("<{CITO}Citation>"));
        triple(format!("<{CITO}hasCitingEntity>"), format!("<{}>", entity_iri(&self.citing)));
        triple(format!("<{CITO}hasCitedEntity>"), format!("<{}>", entity_iri(&self.cited)));
        if let Some(creation) = &self.creation {
            triple(
                format!("<{CITO}hasCitationCreationDate>"),
                typed_literal(creation, date_type(creation)),
            );
        }
        if let Some(span) = &self.timespan {
            triple(format!("<{CITO}hasCitationTimeSpan>"), typed_literal(span, "duration"));
        }
        if self.journal_sc {
            triple(format!("<{RDF}type>"), format!("<{CITO}JournalSelfCitation>"));
        }
        if self.author_sc {
            triple(format!("<{RDF}type>"), format!("<{CITO}AuthorSelfCitation>"));
        }
        out
    }

    /// Provenance of the first snapshot in N-Quads, in the citation's
    /// provenance graph.
    pub fn prov_nquads(&self, base: &str, agent: &str, source: &str, created: &str) -> String {
        let graph = format!("<{}ci/{}/prov/>", base, self.oci);
        let se = format!("<{}ci/{}/prov/se/1>", base, self.oci);
        let ci = self.iri(base);
        let mut out = String::new();
        let mut quad =
            |p: String, o: String| out.push_str(&format!("{} {} {} {} .\n", se, p, o, graph));
        quad(format!("<{RDF}type>"), format!("<{PROV}Entity>"));
        quad(format!("<{PROV}specializationOf>"), ci);
        quad(format!("<{PROV}wasAttributedTo>"), format!("<{}>", agent));
        quad(format!("<{PROV}hadPrimarySource>"), format!("<{}>", source));
        quad(format!("<{PROV}generatedAtTime>"), typed_literal(created, "dateTime"));
        quad(format!("<{DESCRIPTION}>"), format!("\"{}\"", escape_literal(CREATION_NOTE)));
        out
    }

    /// The Scholix link package of this citation.
    pub fn to_scholix(&self, service: &str, created: &str) -> Value {
        let side = |id: &str, date: &Option<String>| {
            let (scheme, body) = Scheme::split(id)
                .map(|(s, b)| (s.name(), b))
                .unwrap_or(("", id));
            let mut out = json!({
                "Identifier": {"ID": body, "IDScheme": scheme, "IDURL": entity_iri(id)},
                "Type": {"Name": "literature"},
            });
            if let Some(date) = date {
                out["PublicationDate"] = json!(date);
            }
            out
        };
        json!({
            "LinkPublicationDate": created,
            "LinkProvider": [{"Name": "OpenCitations"}, {"Name": service}],
            "RelationshipType": {"Name": "References"},
            "LicenseURL": CC0,
            "Source": side(&self.citing, &self.citing_date),
            "Target": side(&self.cited, &self.cited_date),
        })
    }
}

/// The IRI an identifier resolves to.
pub fn entity_iri(prefixed: &str) -> String {
    let Some((scheme, body)) = Scheme::split(prefixed) else {
        return prefixed.to_string();
    };
    match scheme {
        Scheme::Doi => format!("http://dx.doi.org/{}", quote_iri(body)),
        Scheme::Pmid => format!("https://pubmed.ncbi.nlm.nih.gov/{}", body),
        Scheme::Omid | Scheme::Meta => format!("https://w3id.org/oc/meta/{}", body),
        Scheme::Wikidata => format!("http://www.wikidata.org/entity/{}", body),
        other => format!("urn:{}:{}", other.name(), quote_iri(body)),
    }
}

fn quote_iri(body: &str) -> String {
    urlencoding::encode(body).replace("%2F", "/")
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn typed_literal(value: &str, xsd_type: &str) -> String {
    format!("\"{}\"^^<{}{}>", escape_literal(value), XSD, xsd_type)
}

fn date_type(date: &str) -> &'static str {
    match date.len() {
        4 => "gYear",
        7 => "gYearMonth",
        _ => "date",
    }
}

/// File sizes and provenance values for a [`CitationStorer`].
#[derive(Debug, Clone)]
pub struct StorerSettings {
    /// Base of the citation IRIs.
    pub base_url: String,
    pub service: String,
    /// IRI of the agent responsible for the citations.
    pub agent: String,
    /// IRI of the dump the citations were read from.
    pub source: String,
    /// Appended to file names, so parallel storers never share a file.
    pub suffix: Option<String>,
    pub csv_per_file: usize,
    pub rdf_per_file: usize,
    pub slx_per_file: usize,
}

impl StorerSettings {
    pub fn new(service: impl Into<String>, agent: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            base_url: INDEX_BASE.to_string(),
            service: service.into(),
            agent: agent.into(),
            source: source.into(),
            suffix: None,
            csv_per_file: 10_000_000,
            rdf_per_file: 1_000_000,
            slx_per_file: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Layout {
    Csv(&'static [&'static str]),
    Lines,
    JsonArray,
}

/// A numbered sequence of files `{stem}_{n}.{ext}`, rotated every `limit`
/// entries. Numbering continues after the files already in `dir`.
struct Shard {
    dir: PathBuf,
    stem: String,
    ext: &'static str,
    layout: Layout,
    limit: usize,
    index: usize,
    count: usize,
    file: Option<BufWriter<File>>,
}

impl Shard {
    fn open(
        dir: PathBuf,
        stem: &str,
        ext: &'static str,
        layout: Layout,
        limit: usize,
    ) -> Result<Self, IngestError> {
        std::fs::create_dir_all(&dir)?;
        let lead = format!("{}_", stem);
        let tail = format!(".{}", ext);
        let last = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_prefix(&lead)?
                    .strip_suffix(&tail)?
                    .parse::<usize>()
                    .ok()
            })
            .max()
            .unwrap_or(0);
        Ok(Self {
            dir,
            stem: stem.to_string(),
            ext,
            layout,
            limit: limit.max(1),
            index: last + 1,
            count: 0,
            file: None,
        })
    }

    fn path(&self) -> PathBuf {
        self.dir.join(format!("{}_{}.{}", self.stem, self.index, self.ext))
    }

    fn create(&self) -> Result<BufWriter<File>, IngestError> {
        let mut writer = BufWriter::new(File::create(self.path())?);
        match self.layout {
            Layout::Csv(header) => writer.write_all(&csv_line(header)?)?,
            Layout::JsonArray => writer.write_all(b"[")?,
            Layout::Lines => {}
        }
        Ok(writer)
    }

    fn push(&mut self, entry: &[u8]) -> Result<(), IngestError> {
        if self.count >= self.limit {
            self.close()?;
            self.index += 1;
            self.count = 0;
        }
        let json = matches!(self.layout, Layout::JsonArray);
        let comma = json && self.count > 0;
        let writer = match self.file.take() {
            Some(writer) => writer,
            None => self.create()?,
        };
        let writer = self.file.insert(writer);
        if comma {
            writer.write_all(b",")?;
        }
        if json {
            writer.write_all(b"\n")?;
        }
        writer.write_all(entry)?;
        self.count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), IngestError> {
        if let Some(mut writer) = self.file.take() {
            if matches!(self.layout, Layout::JsonArray) {
                writer.write_all(b"]")?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for Shard {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(path = %self.path().display(), error = %e, "closing citation file failed");
        }
    }
}

fn csv_line<S: AsRef<[u8]>>(fields: &[S]) -> Result<Vec<u8>, IngestError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| IngestError::Io(std::io::Error::other(e.to_string())))
}

/// Stores citations as CSV, RDF and Scholix under one directory:
///
/// ```text
/// {dest}/data/{csv,rdf,slx}/YYYY/MM/{stamp}_{n}.{csv,ttl,scholix}
/// {dest}/prov/{csv,rdf}/YYYY/MM/{stamp}_{n}.{csv,ttl}
/// ```
///
/// RDF data files are N-Triples, RDF provenance files N-Quads.
pub struct CitationStorer {
    settings: StorerSettings,
    created: String,
    data_csv: Shard,
    prov_csv: Shard,
    data_rdf: Shard,
    prov_rdf: Shard,
    data_slx: Shard,
    stored: usize,
}

impl CitationStorer {
    pub fn open(dest: &Path, settings: StorerSettings) -> Result<Self, IngestError> {
        Self::open_at(dest, settings, Local::now().naive_local())
    }

    /// Open with an explicit creation time, which names the files and
    /// stamps the provenance.
    pub fn open_at(dest: &Path, settings: StorerSettings, now: NaiveDateTime) -> Result<Self, IngestError> {
        let month = now.format("%Y/%m").to_string();
        let stem = format!(
            "{}{}",
            now.format("%Y-%m-%dT%H%M%S"),
            settings.suffix.as_deref().map(|s| format!("_{}", s)).unwrap_or_default()
        );
        let dir = |kind: &str, format: &str| dest.join(kind).join(format).join(&month);
        let storer = Self {
            created: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            data_csv: Shard::open(dir("data", "csv"), &stem, "csv", Layout::Csv(&DATA_HEADER), settings.csv_per_file)?,
            prov_csv: Shard::open(dir("prov", "csv"), &stem, "csv", Layout::Csv(&PROV_HEADER), settings.csv_per_file)?,
            data_rdf: Shard::open(dir("data", "rdf"), &stem, "ttl", Layout::Lines, settings.rdf_per_file)?,
            prov_rdf: Shard::open(dir("prov", "rdf"), &stem, "ttl", Layout::Lines, settings.rdf_per_file)?,
            data_slx: Shard::open(dir("data", "slx"), &stem, "scholix", Layout::JsonArray, settings.slx_per_file)?,
            settings,
            stored: 0,
        };
        tracing::debug!(dest = %dest.display(), stem = %stem, "citation storer ready");
        Ok(storer)
    }

    pub fn stored(&self) -> usize {
        self.stored
    }

    pub fn store(&mut self, citation: &Citation) -> Result<(), IngestError> {
        let s = &self.settings;
        self.data_csv.push(&csv_line(&citation.data_record())?)?;
        self.prov_csv
            .push(&csv_line(&citation.prov_record(&s.agent, &s.source, &self.created))?)?;
        self.data_rdf.push(citation.to_ntriples(&s.base_url).as_bytes())?;
        self.prov_rdf.push(
            citation
                .prov_nquads(&s.base_url, &s.agent, &s.source, &self.created)
                .as_bytes(),
        )?;
        let scholix = serde_json::to_string_pretty(&citation.to_scholix(&s.service, &self.created))?;
        self.data_slx.push(scholix.as_bytes())?;
        self.stored += 1;
        Ok(())
    }

    /// Close every open file; returns the number of citations stored.
    pub fn finish(mut self) -> Result<usize, IngestError> {
        for shard in [
            &mut self.data_csv,
            &mut self.prov_csv,
            &mut self.data_rdf,
            &mut self.prov_rdf,
            &mut self.data_slx,
        ] {
            shard.close()?;
        }
        Ok(self.stored)
    }
}

struct OciSink<'a> {
    minter: &'a mut OciMinter,
    storer: &'a mut CitationStorer,
    existing: &'a HashSet<String>,
    seen: HashSet<String>,
    report: EmitReport,
}

impl CitationSink for OciSink<'_> {
    fn write(&mut self, row: &CitationData) -> Result<bool, IngestError> {
        let Some(oci) = self.minter.mint(&row.citing, &row.cited) else {
            self.report.invalid += 1;
            return Ok(false);
        };
        if self.existing.contains(&oci) || !self.seen.insert(oci.clone()) {
            self.report.duplicates += 1;
            return Ok(false);
        }
        self.storer.store(&Citation::new(oci, row))?;
        self.report.written += 1;
        Ok(true)
    }

    fn skip_invalid(&mut self) {
        self.report.invalid += 1;
    }
}

/// Enrich `tuples` from `cache` and store them as OCI-keyed citations.
///
/// A citation whose OCI is in `existing`, or was stored earlier in the same
/// call, counts as a duplicate.
pub fn store_citations(
    tuples: &[CitationData],
    scheme: Scheme,
    cache: &dyn DataSource,
    minter: &mut OciMinter,
    storer: &mut CitationStorer,
    existing: &HashSet<String>,
) -> Result<EmitReport, IngestError> {
    let mut sink = OciSink {
        minter,
        storer,
        existing,
        seen: HashSet::new(),
        report: EmitReport::default(),
    };
    emit_into(tuples, scheme, cache, &mut sink)?;
    tracing::info!(
        service = %sink.storer.settings.service,
        written = sink.report.written,
        duplicates = sink.report.duplicates,
        invalid = sink.report.invalid,
        "stored citations"
    );
    Ok(sink.report)
}
