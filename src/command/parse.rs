//! Text forms accepted on the command line.

use chrono::{DateTime, NaiveDateTime};

use crate::engine::table::{FieldSpec, SortDirection, SortKey};
use crate::engine::types::{AggFunc, Field};
use crate::query::errors::QueryError;
use crate::query::query_spec::TimeWindow;

fn argument(msg: impl Into<String>) -> QueryError {
    QueryError::Argument(msg.into())
}

fn parse_field(name: &str) -> Result<Field, QueryError> {
    name.parse::<Field>().map_err(argument)
}

/// `field[/ipv4_prefix[/ipv6_prefix]]`. Prefixes are only valid on
/// address fields; a missing IPv6 prefix stays at full length.
pub fn parse_field_spec(text: &str) -> Result<FieldSpec, QueryError> {
    let mut parts = text.trim().split('/');
    let field = parse_field(parts.next().unwrap_or_default())?;
    let v4 = parts.next();
    let v6 = parts.next();
    if parts.next().is_some() {
        return Err(argument(format!("too many prefix lengths in '{text}'")));
    }
    if v4.is_none() {
        return Ok(FieldSpec::new(field));
    }
    if !field.is_address() {
        return Err(argument(format!("field {field} does not take a prefix length")));
    }
    let ipv4_prefix = parse_prefix(v4, 32, text)?;
    let ipv6_prefix = parse_prefix(v6, 128, text)?;
    Ok(FieldSpec::with_prefix(field, ipv4_prefix, ipv6_prefix))
}

fn parse_prefix(raw: Option<&str>, max: u8, text: &str) -> Result<u8, QueryError> {
    let Some(raw) = raw else {
        return Ok(max);
    };
    match raw.parse::<u8>() {
        Ok(prefix) if prefix <= max => Ok(prefix),
        _ => Err(argument(format!("invalid prefix length '{raw}' in '{text}' (max {max})"))),
    }
}

pub fn parse_field_list(text: &str) -> Result<Vec<FieldSpec>, QueryError> {
    let specs = text
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_field_spec)
        .collect::<Result<Vec<_>, _>>()?;
    if specs.is_empty() {
        return Err(argument("empty field list"));
    }
    Ok(specs)
}

/// `field[#asc|#desc][/agg]`; descending unless stated.
pub fn parse_sort_key(text: &str) -> Result<SortKey, QueryError> {
    let (head, agg) = match text.trim().split_once('/') {
        Some((head, agg)) => (head, Some(agg)),
        None => (text.trim(), None),
    };
    let (name, direction) = match head.split_once('#') {
        Some((name, dir)) => (name, parse_direction(dir)?),
        None => (head, SortDirection::Desc),
    };
    let mut key = SortKey::new(parse_field(name)?, direction);
    if let Some(agg) = agg {
        key.agg = Some(agg.parse::<AggFunc>().map_err(argument)?);
    }
    Ok(key)
}

fn parse_direction(text: &str) -> Result<SortDirection, QueryError> {
    match text.to_ascii_lowercase().as_str() {
        "asc" => Ok(SortDirection::Asc),
        "desc" => Ok(SortDirection::Desc),
        other => Err(argument(format!("unknown sort direction '{other}'"))),
    }
}

/// `field[/sortfield]` of the statistic shortcut. The key may carry prefix
/// lengths, so only a trailing component naming a known non-numeric token
/// is taken as the sort field.
pub fn parse_stat(text: &str) -> Result<(FieldSpec, Option<Field>), QueryError> {
    let text = text.trim();
    if let Some((key, sort)) = text.rsplit_once('/') {
        if let Ok(sort) = sort.parse::<Field>() {
            return Ok((parse_field_spec(key)?, Some(sort)));
        }
    }
    Ok((parse_field_spec(text)?, None))
}

/// Milliseconds since the epoch. Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]`
/// (UTC) or unix seconds.
pub fn parse_time(text: &str) -> Result<u64, QueryError> {
    let text = text.trim();
    let millis = if let Ok(secs) = text.parse::<u64>() {
        secs.checked_mul(1000)
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        u64::try_from(dt.timestamp_millis()).ok()
    } else {
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .and_then(|dt| u64::try_from(dt.and_utc().timestamp_millis()).ok())
    };
    millis.ok_or_else(|| argument(format!("cannot parse time '{text}'")))
}

/// `start,end`, both inclusive.
pub fn parse_time_range(text: &str) -> Result<TimeWindow, QueryError> {
    let (start, end) = text
        .split_once(',')
        .ok_or_else(|| argument(format!("time range '{text}' is not 'start,end'")))?;
    TimeWindow::new(parse_time(start)?, parse_time(end)?)
}
