use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::*;

/// A persisted legislative act, keyed by its surrogate `id` and unique `code`.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = legislacoes)]
#[serde(rename_all = "camelCase")]
pub struct LegislativeAct {
    pub id: i32,
    pub code: String,
    pub act_type: String,
    pub number: String,
    pub norm_name: String,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub signing_date: Option<NaiveDate>,
    pub signing_year: Option<i32>,
    pub alias: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every mapped column of an act. Used both for inserts and for the full
/// overwrite performed by an upsert, where `None` clears the column.
#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = legislacoes, treat_none_as_null = true)]
pub struct NewLegislativeAct {
    pub code: String,
    pub act_type: String,
    pub number: String,
    pub norm_name: String,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub signing_date: Option<NaiveDate>,
    pub signing_year: Option<i32>,
    pub alias: Option<String>,
}

/// Partial update: an outer `None` leaves the column untouched, `Some(None)`
/// clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = legislacoes)]
pub struct ActChanges {
    pub code: Option<String>,
    pub act_type: Option<String>,
    pub number: Option<String>,
    pub norm_name: Option<String>,
    pub description: Option<Option<String>>,
    pub summary: Option<Option<String>>,
    pub signing_date: Option<Option<NaiveDate>>,
    pub signing_year: Option<Option<i32>>,
    pub alias: Option<Option<String>>,
}

impl From<NewLegislativeAct> for ActChanges {
    fn from(act: NewLegislativeAct) -> Self {
        Self {
            code: Some(act.code),
            act_type: Some(act.act_type),
            number: Some(act.number),
            norm_name: Some(act.norm_name),
            description: Some(act.description),
            summary: Some(act.summary),
            signing_date: Some(act.signing_date),
            signing_year: Some(act.signing_year),
            alias: Some(act.alias),
        }
    }
}
