//! Endpoint handlers. Pure functions of the request and shared state.

use std::str;
use std::sync::Arc;

use switchwatch_core::StateRegistry;
use switchwatch_types::{OptInAck, SecretString, StatusReport, SubscriberId};
use url::form_urlencoded;

use crate::request::Request;
use crate::response::Response;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// State shared by every connection.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub registry: Arc<StateRegistry>,
    pub verification_token: SecretString,
}

#[must_use]
pub fn handle_request(request: &Request, state: &ApiState) -> Response {
    match (request.path.as_str(), request.method.as_str()) {
        ("/status", "GET") => status(state),
        ("/status", _) => Response::method_not_allowed("GET"),
        ("/optin", "POST") => opt_in(request, state),
        ("/optin", _) => Response::method_not_allowed("POST"),
        _ => Response::not_found(),
    }
}

fn status(state: &ApiState) -> Response {
    Response::json(
        200,
        &StatusReport {
            state: state.registry.get(),
        },
    )
}

fn opt_in(request: &Request, state: &ApiState) -> Response {
    let Ok(form) = Form::from_request(request) else {
        return Response::text(400, "Invalid request format");
    };

    let token = form.value("token").unwrap_or_default();
    if !state.verification_token.matches(token) {
        tracing::warn!("Rejected opt-in with invalid token");
        return Response::text(401, "Invalid user or token");
    }

    let Ok(id) = SubscriberId::new(form.value("user_id").unwrap_or_default()) else {
        return Response::text(401, "Invalid user or token");
    };

    if state.registry.opt_in(id.clone()) {
        tracing::info!(user_id = %id, "User opted in for notifications");
    } else {
        tracing::debug!(user_id = %id, "Repeat opt-in");
    }

    Response::json(200, &OptInAck::for_subscriber(&id))
}

#[derive(Debug)]
struct InvalidForm;

/// Decoded form fields. Body fields take precedence over query fields.
#[derive(Debug, Default)]
struct Form {
    body: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl Form {
    fn from_request(request: &Request) -> Result<Self, InvalidForm> {
        let query = match &request.query {
            Some(raw) => decode(raw.as_bytes())?,
            None => Vec::new(),
        };

        let is_form = request.header("content-type").is_none_or(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        });
        let body = if is_form {
            decode(&request.body)?
        } else {
            Vec::new()
        };

        Ok(Self { body, query })
    }

    fn value(&self, key: &str) -> Option<&str> {
        first(&self.body, key).or_else(|| first(&self.query, key))
    }
}

fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Decode `application/x-www-form-urlencoded`, rejecting non-UTF-8 input and
/// broken percent escapes that the lenient decoder would pass through.
fn decode(raw: &[u8]) -> Result<Vec<(String, String)>, InvalidForm> {
    str::from_utf8(raw).map_err(|_| InvalidForm)?;
    if !percent_escapes_valid(raw) {
        return Err(InvalidForm);
    }
    Ok(form_urlencoded::parse(raw)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

fn percent_escapes_valid(raw: &[u8]) -> bool {
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            match raw.get(i + 1..i + 3) {
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}
