//! Extracted records - normalized tax expense and executive compensation facts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RecordError;
use crate::types::cik::Cik;

/// A non-negative monetary amount in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Create an amount, rejecting negative values.
    pub fn new(value: Decimal) -> Result<Self, RecordError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(RecordError::NegativeAmount(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Create an amount from a source value, treating negatives as absent.
    pub fn non_negative(value: Decimal) -> Option<Self> {
        Self::new(value).ok()
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = RecordError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tax expense facts for one fiscal year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxExpense {
    /// Total income tax expense
    pub total: Option<Amount>,

    /// Current portion
    pub current: Option<Amount>,

    /// Deferred portion
    pub deferred: Option<Amount>,
}

impl TaxExpense {
    pub fn is_empty(&self) -> bool {
        self.total.is_none() && self.current.is_none() && self.deferred.is_none()
    }
}

/// One executive's row from a summary compensation table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveCompensation {
    pub executive_name: String,
    pub title: Option<String>,
    pub salary: Option<Amount>,
    pub bonus: Option<Amount>,
    pub stock_awards: Option<Amount>,
    pub option_awards: Option<Amount>,
    pub non_equity_incentive: Option<Amount>,
    pub other_compensation: Option<Amount>,
    pub total: Option<Amount>,
}

impl ExecutiveCompensation {
    pub fn new(executive_name: impl Into<String>) -> Self {
        Self {
            executive_name: executive_name.into(),
            ..Default::default()
        }
    }

    pub fn has_amounts(&self) -> bool {
        [
            self.salary,
            self.bonus,
            self.stock_awards,
            self.option_awards,
            self.non_equity_incentive,
            self.other_compensation,
            self.total,
        ]
        .iter()
        .any(Option::is_some)
    }
}

/// The facts carried by a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordFacts {
    TaxExpense(TaxExpense),
    ExecutiveCompensation(ExecutiveCompensation),
}

/// Normalized output of an extraction function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub cik: Cik,
    pub fiscal_year: i32,
    pub facts: RecordFacts,

    /// Identifier of the document the facts were read from
    pub source_document: String,

    /// Extraction confidence in `[0, 1]`, if the extractor reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl ExtractedRecord {
    pub fn new(
        cik: Cik,
        fiscal_year: i32,
        facts: RecordFacts,
        source_document: impl Into<String>,
    ) -> Self {
        Self {
            cik,
            fiscal_year,
            facts,
            source_document: source_document.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn tax_expense(&self) -> Option<&TaxExpense> {
        match &self.facts {
            RecordFacts::TaxExpense(t) => Some(t),
            _ => None,
        }
    }

    pub fn compensation(&self) -> Option<&ExecutiveCompensation> {
        match &self.facts {
            RecordFacts::ExecutiveCompensation(c) => Some(c),
            _ => None,
        }
    }
}
