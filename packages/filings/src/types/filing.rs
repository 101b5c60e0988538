//! Filings API response types.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! upstream documents is ignored on deserialization.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Submission history for one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submissions {
    pub cik: String,
    #[serde(default)]
    pub name: String,
    pub filings: SubmissionFilings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionFilings {
    pub recent: RecentFilings,
}

/// Column-oriented list of recent filings, as served by the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilings {
    #[serde(default)]
    pub accession_number: Vec<String>,
    #[serde(default)]
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub report_date: Vec<String>,
    #[serde(default)]
    pub form: Vec<String>,
    #[serde(default)]
    pub primary_document: Vec<String>,
}

/// One row of [`RecentFilings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRef {
    pub accession_number: String,
    pub filing_date: Option<NaiveDate>,
    pub report_date: Option<NaiveDate>,
    pub form: String,
    pub primary_document: String,
}

impl FilingRef {
    /// Stable identifier used as record provenance.
    pub fn document_id(&self) -> String {
        format!("{}/{}", self.accession_number, self.primary_document)
    }
}

impl RecentFilings {
    pub fn len(&self) -> usize {
        self.accession_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accession_number.is_empty()
    }

    /// Iterate rows. Rows with missing columns are skipped.
    pub fn iter(&self) -> impl Iterator<Item = FilingRef> + '_ {
        (0..self.len()).filter_map(move |i| {
            Some(FilingRef {
                accession_number: self.accession_number.get(i)?.clone(),
                filing_date: self.filing_date.get(i).and_then(|d| parse_date(d)),
                report_date: self.report_date.get(i).and_then(|d| parse_date(d)),
                form: self.form.get(i)?.clone(),
                primary_document: self.primary_document.get(i)?.clone(),
            })
        })
    }

    /// Latest filing of `form` filed during `filing_year`.
    pub fn find(&self, form: &str, filing_year: i32) -> Option<FilingRef> {
        self.iter()
            .filter(|f| f.form == form)
            .filter(|f| f.filing_date.map(|d| d.year()) == Some(filing_year))
            .max_by_key(|f| f.filing_date)
    }

    /// Proxy statement covering compensation paid in `fiscal_year`.
    ///
    /// Proxies are filed the year after the fiscal year they report on.
    pub fn proxy_statement_for(&self, fiscal_year: i32) -> Option<FilingRef> {
        self.find("DEF 14A", fiscal_year + 1)
    }

    /// Annual report for `fiscal_year`, matched on report period.
    pub fn annual_report_for(&self, fiscal_year: i32) -> Option<FilingRef> {
        self.iter()
            .filter(|f| f.form == "10-K")
            .filter(|f| f.report_date.map(|d| d.year()) == Some(fiscal_year))
            .max_by_key(|f| f.filing_date)
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Structured XBRL facts for one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyFacts {
    #[serde(default)]
    pub entity_name: String,
    /// taxonomy -> concept -> facts
    #[serde(default)]
    pub facts: HashMap<String, HashMap<String, Concept>>,
}

impl CompanyFacts {
    pub fn concept(&self, taxonomy: &str, name: &str) -> Option<&Concept> {
        self.facts.get(taxonomy)?.get(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub label: Option<String>,
    /// unit (e.g. "USD") -> reported values
    #[serde(default)]
    pub units: HashMap<String, Vec<FactValue>>,
}

/// One reported value of a concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactValue {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
    pub val: Decimal,
    pub accn: String,
    #[serde(default)]
    pub fy: Option<i32>,
    #[serde(default)]
    pub fp: Option<String>,
    pub form: String,
    #[serde(default)]
    pub filed: Option<NaiveDate>,
    #[serde(default)]
    pub frame: Option<String>,
}

impl FactValue {
    /// Whether this value covers a full annual period.
    pub fn is_annual(&self) -> bool {
        match self.start {
            Some(start) => (self.end - start).num_days() >= 350,
            None => self.fp.as_deref() == Some("FY"),
        }
    }
}
