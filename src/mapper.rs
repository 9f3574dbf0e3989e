//! Conversion of API documents into the persisted act shape. Pure, no I/O.
//!
//! Numeric pieces are read the lenient way the upstream data needs: leading
//! whitespace is skipped, an optional sign is honoured, and parsing stops at
//! the first non-digit (`"2021 "` and `"05x"` both parse). Calendar values
//! are not range-checked; out-of-range days and months roll over into the
//! neighbouring month or year (`31/02/2021` is 3 March 2021). Two-digit
//! years are taken literally: `05/03/21` is year 21, not 1921.

use chrono::{Months, NaiveDate};
use thiserror::Error;

use crate::models::NewLegislativeAct;
use crate::senado::ExternalDocument;

/// Result of mapping one document; identity fields may still be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedAct {
    pub code: Option<String>,
    pub act_type: Option<String>,
    pub number: Option<String>,
    pub norm_name: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub signing_date: Option<NaiveDate>,
    pub signing_year: Option<i32>,
    pub alias: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("document is missing required field `{0}`")]
    MissingField(&'static str),
}

impl MappedAct {
    /// Whether `code`, `act_type` and `number` are all present and non-empty.
    pub fn has_identity(&self) -> bool {
        self.missing_identity_field().is_none()
    }

    pub fn missing_identity_field(&self) -> Option<&'static str> {
        [
            ("code", &self.code),
            ("act_type", &self.act_type),
            ("number", &self.number),
        ]
        .into_iter()
        .find(|(_, value)| is_blank(value))
        .map(|(name, _)| name)
    }

    pub fn into_new_act(self) -> Result<NewLegislativeAct, MappingError> {
        if let Some(field) = self.missing_identity_field() {
            return Err(MappingError::MissingField(field));
        }
        Ok(NewLegislativeAct {
            code: required(self.code, "code")?,
            act_type: required(self.act_type, "act_type")?,
            number: required(self.number, "number")?,
            norm_name: required(self.norm_name, "norm_name")?,
            description: self.description,
            summary: self.summary,
            signing_date: self.signing_date,
            signing_year: self.signing_year,
            alias: self.alias,
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn required(value: Option<String>, field: &'static str) -> Result<String, MappingError> {
    value.ok_or(MappingError::MissingField(field))
}

pub fn map_document(doc: &ExternalDocument) -> MappedAct {
    MappedAct {
        code: doc.norma.clone(),
        act_type: doc.tipo.clone(),
        number: doc.numero.clone(),
        norm_name: doc.norma_nome.clone(),
        description: doc.descricao.clone(),
        summary: doc.ementa.clone(),
        signing_date: doc.dataassinatura.as_deref().and_then(parse_signing_date),
        signing_year: doc.anoassinatura.as_deref().and_then(parse_leading_int),
        alias: doc.apelido.clone(),
    }
}

/// Parses `DD/MM/YYYY`. Any empty piece yields `None`.
pub fn parse_signing_date(raw: &str) -> Option<NaiveDate> {
    let mut pieces = raw.split('/');
    let day = pieces.next().filter(|piece| !piece.is_empty())?;
    let month = pieces.next().filter(|piece| !piece.is_empty())?;
    let year = pieces.next().filter(|piece| !piece.is_empty())?;

    normalized_date(
        parse_leading_int(year)?,
        parse_leading_int(month)?,
        parse_leading_int(day)?,
    )
}

/// Builds a date from possibly out-of-range parts by rolling excess months
/// and days forward (or backward) from the first day of `year`.
fn normalized_date(year: i32, month: i32, day: i32) -> Option<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let month_offset = month - 1;
    let first_of_month = if month_offset >= 0 {
        start.checked_add_months(Months::new(month_offset.unsigned_abs()))?
    } else {
        start.checked_sub_months(Months::new(month_offset.unsigned_abs()))?
    };
    let day_offset = chrono::Duration::try_days(i64::from(day) - 1)?;
    first_of_month.checked_add_signed(day_offset)
}

pub fn parse_leading_int(raw: &str) -> Option<i32> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value: i32 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}
