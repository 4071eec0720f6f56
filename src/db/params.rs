//! Positional parameter binding for the sqlx-backed adapters.

use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

use crate::models::QueryParam;

/// Build a prepared query for `statement` with every parameter bound in order.
///
/// NULL is bound as a nullable text value; both the MySQL protocol and SQLite
/// accept it for any column type.
pub(crate) fn bind_params<'q, DB>(
    statement: &'q str,
    params: &'q [QueryParam],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
{
    params
        .iter()
        .fold(sqlx::query::<DB>(statement), |query, param| match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
        })
}
