use std::str::FromStr;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use super::state::AppState;
use crate::api_error;
use crate::error::Result;
use crate::global::{BOT_HASH_HEADER, BOT_LIMIT_HEADER};

fn parse_header<T: FromStr>(headers: &HeaderMap, name: &str) -> Result<T> {
    let value = headers
        .get(name)
        .ok_or_else(|| api_error!("missing {} header", name))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .ok_or_else(|| api_error!("invalid {} header", name))
}

/// Positive limit from the `Bot-Limit` header. Values past `u32::MAX` are
/// clamped to it.
fn parse_limit(headers: &HeaderMap) -> Result<u32> {
    let limit: u64 = parse_header(headers, BOT_LIMIT_HEADER)?;
    if limit == 0 {
        return Err(api_error!("{} must be positive", BOT_LIMIT_HEADER));
    }
    Ok(u32::try_from(limit).unwrap_or(u32::MAX))
}

/// Receiving side of the remote grant protocol.
///
/// Runs the local gate for the caller and only answers once a unit has been
/// granted.
#[instrument(skip(state, headers), level = "debug")]
pub async fn take_global(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let bot_hash: u64 = parse_header(&headers, BOT_HASH_HEADER)?;
    let bot_limit = parse_limit(&headers)?;

    state.gate().take(bot_hash, bot_limit).await.map_err(|err| {
        event!(
            Level::ERROR,
            message = "Failed taking global token",
            bot_hash,
            err = format!("{:?}", err)
        );
        err
    })?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MemberResponse {
    pub name: String,
    pub address: String,
}

/// Peers known from cluster membership, with their proxy addresses
#[instrument(skip(state), level = "debug")]
pub async fn members(State(state): State<AppState>) -> Json<Vec<MemberResponse>> {
    let mut members: Vec<MemberResponse> = state
        .peers
        .peers()
        .into_iter()
        .map(|(name, address)| MemberResponse {
            name: name.to_string(),
            address,
        })
        .collect();
    members.sort_by(|a, b| a.name.cmp(&b.name));
    Json(members)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::error::NirnError;

    fn headers(hash: &'static str, limit: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(BOT_HASH_HEADER, HeaderValue::from_static(hash));
        headers.insert(BOT_LIMIT_HEADER, HeaderValue::from_static(limit));
        headers
    }

    #[test]
    fn parses_decimal_headers() {
        let headers = headers("18446744073709551615", " 50 ");
        assert_eq!(
            parse_header::<u64>(&headers, BOT_HASH_HEADER).unwrap(),
            u64::MAX
        );
        assert_eq!(parse_header::<u32>(&headers, BOT_LIMIT_HEADER).unwrap(), 50);
    }

    #[test]
    fn rejects_missing_and_garbage_headers() {
        let headers = headers("abc", "-1");
        assert!(matches!(
            parse_header::<u64>(&headers, BOT_HASH_HEADER),
            Err(NirnError::Api(_))
        ));
        assert!(matches!(
            parse_header::<u32>(&headers, BOT_LIMIT_HEADER),
            Err(NirnError::Api(_))
        ));
        assert!(matches!(
            parse_header::<u32>(&HeaderMap::new(), BOT_LIMIT_HEADER),
            Err(NirnError::Api(_))
        ));
    }

    #[test]
    fn oversized_limits_are_clamped() {
        assert_eq!(parse_limit(&headers("1", "4294967296")).unwrap(), u32::MAX);
        assert_eq!(
            parse_limit(&headers("1", "18446744073709551615")).unwrap(),
            u32::MAX
        );
        assert_eq!(parse_limit(&headers("1", "50")).unwrap(), 50);
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(
            parse_limit(&headers("1", "0")),
            Err(NirnError::Api(_))
        ));
    }
}
