//! Application of node authentication to outbound requests.

use jiff::Timestamp;
use nodeflow_runtime::definition::{AuthConfig, AuthType};
use reqwest::RequestBuilder;

use crate::{Error, Result};

const API_KEY: &[&str] = &["apiKey", "api_key", "key"];
const API_KEY_HEADER: &[&str] = &["headerName", "header_name", "header"];
const API_KEY_LOCATION: &[&str] = &["in", "location"];
const API_KEY_PARAM: &[&str] = &["paramName", "param_name", "queryParam"];
const BEARER_TOKEN: &[&str] = &["token", "bearerToken", "bearer_token", "accessToken"];
const ACCESS_TOKEN: &[&str] = &["accessToken", "access_token", "token"];

/// Header used for API keys when none is configured.
const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
/// Query parameter used for API keys when none is configured.
const DEFAULT_API_KEY_PARAM: &str = "api_key";

/// Applies `auth` to the request.
///
/// OAuth2 tokens that are expired at `now` are rejected; refreshing them is
/// left to whoever owns the credentials.
pub(crate) fn apply(
    builder: RequestBuilder,
    auth: &AuthConfig,
    now: Timestamp,
) -> Result<RequestBuilder> {
    let builder = match auth.auth_type {
        AuthType::None => builder,
        AuthType::ApiKey => {
            let key = required(auth, API_KEY, "api key")?;
            let in_query = auth
                .credential(API_KEY_LOCATION)
                .is_some_and(|location| location.eq_ignore_ascii_case("query"));

            if in_query {
                let param = auth.credential(API_KEY_PARAM).unwrap_or(DEFAULT_API_KEY_PARAM);
                builder.query(&[(param, key)])
            } else {
                let header = auth.credential(API_KEY_HEADER).unwrap_or(DEFAULT_API_KEY_HEADER);
                builder.header(header, key)
            }
        }
        AuthType::BearerToken => builder.bearer_auth(required(auth, BEARER_TOKEN, "bearer token")?),
        AuthType::BasicAuth => {
            let username = required(auth, &["username", "user"], "username")?;
            builder.basic_auth(username, auth.credential(&["password"]))
        }
        AuthType::OAuth2 => {
            if auth.is_expired(now) {
                return Err(Error::Authentication("oauth2 access token expired".into()));
            }
            builder.bearer_auth(required(auth, ACCESS_TOKEN, "oauth2 access token")?)
        }
    };

    Ok(builder)
}

fn required<'a>(auth: &'a AuthConfig, keys: &[&str], what: &str) -> Result<&'a str> {
    auth.credential(keys)
        .ok_or_else(|| Error::Authentication(format!("missing {what} for {} auth", auth.auth_type)))
}
